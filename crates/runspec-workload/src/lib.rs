//! Workload compilation stages for runspec
//!
//! Each stage turns one part of a run request into Kubernetes-shaped output:
//! - [`resources`]: CPU/memory/GPU limits and requests
//! - [`env`]: ordered, last-write-wins environment sets
//! - [`mounts`]: mutually exclusive mount strategies and secret mounts
//! - [`code`]: inline code packaging
//!
//! The orchestrating compiler lives in `runspec-job`.

pub mod code;
pub mod env;
pub mod error;
pub mod k8s;
pub mod mounts;
pub mod resources;

pub use code::CodePayload;
pub use env::{EnvValue, EnvironmentSet};
pub use error::CompilationError;
pub use mounts::{auto_mount, MountDescriptor, MountStrategy, PvcArgs};
pub use resources::{Quantity, ResourceDescriptor, ResourceLimits, ResourceRequests};
