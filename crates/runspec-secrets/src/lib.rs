//! Secret resolution for runspec
//!
//! A [`SecretResolver`] dispatches each [`SecretDeclaration`] to the backend
//! registered for its kind. Backends turn declarations into environment
//! entries, an optional secret mount, and a [`SecretReference`] that names
//! where the material lives. Cleartext never leaves a backend except as
//! [`StagedSecrets`], written through the [`SecretStore`] port on submission.

#![deny(missing_docs)]

pub mod backend;
pub mod cluster;
pub mod error;
pub mod inline;
pub mod store;
pub mod vault;

pub use backend::{
    ResolveContext, SecretBackend, SecretDeclaration, SecretReference, SecretResolution,
    SecretResolver,
};
pub use cluster::{KubeIdentityLookup, KubeSecretStore};
pub use error::SecretError;
pub use inline::InlineBackend;
pub use store::{InMemorySecretStore, SecretStore, StagedSecrets, StoreError};
pub use vault::{IdentityLookup, IdentityRecord, LookupError, VaultBackend};

/// Kind name of the inline backend
pub const KIND_INLINE: &str = "inline";

/// Kind name of the vault backend
pub const KIND_VAULT: &str = "vault";
