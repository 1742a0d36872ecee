//! Mount strategy selection and rendering
//!
//! A runtime carries at most one auto-selected mount (network filesystem or
//! PVC). Secret mounts are produced only by secret backends and live on the
//! descriptor next to it.

use std::collections::BTreeMap;

use runspec_common::config::NetworkMountConfig;
use runspec_common::{ENV_NETWORK_ACCESS_KEY, ENV_NETWORK_USERNAME};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::EnvironmentSet;
use crate::k8s::{Volume, VolumeMount};

/// Default volume name for PVC mounts
pub const DEFAULT_PVC_VOLUME_NAME: &str = "pvc";

/// A volume plus where it is mounted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MountDescriptor {
    /// Network filesystem mount authenticated per user
    #[serde(rename_all = "camelCase")]
    Network {
        /// User whose home directory is mounted
        username: String,
        /// Access key for the filesystem driver
        access_key: String,
        /// Flex volume driver
        driver: String,
        /// Container holding user directories
        container: String,
        /// Mount path of the filesystem root
        mount_path: String,
        /// Mount path of the user's home directory
        user_mount_path: String,
        /// Volume name
        volume_name: String,
    },
    /// Persistent volume claim
    #[serde(rename_all = "camelCase")]
    Pvc {
        /// Claim name
        claim_name: String,
        /// Mount path
        mount_path: String,
        /// Volume name
        volume_name: String,
    },
    /// Cluster secret projected as files
    #[serde(rename_all = "camelCase")]
    Secret {
        /// Volume name
        volume_name: String,
        /// Secret name
        secret_name: String,
        /// Mount path
        mount_path: String,
        /// Mode bits for the projected files
        default_mode: i32,
    },
}

impl MountDescriptor {
    /// Short kind name for logs and error context
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Pvc { .. } => "pvc",
            Self::Secret { .. } => "secret",
        }
    }

    /// Volumes backing this mount
    pub fn volumes(&self) -> Vec<Volume> {
        match self {
            Self::Network {
                access_key,
                driver,
                volume_name,
                ..
            } => {
                let options = BTreeMap::from([("accessKey".to_string(), access_key.clone())]);
                vec![Volume::from_flex(volume_name, driver, options)]
            }
            Self::Pvc {
                claim_name,
                volume_name,
                ..
            } => vec![Volume::from_pvc(volume_name, claim_name)],
            Self::Secret {
                volume_name,
                secret_name,
                default_mode,
                ..
            } => vec![Volume::from_secret(volume_name, secret_name, *default_mode)],
        }
    }

    /// Container mounts for this mount's volumes
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        match self {
            Self::Network {
                username,
                container,
                mount_path,
                user_mount_path,
                volume_name,
                ..
            } => vec![
                VolumeMount::new(volume_name, mount_path),
                VolumeMount::new(volume_name, user_mount_path)
                    .with_sub_path(format!("{container}/{username}")),
            ],
            Self::Pvc {
                mount_path,
                volume_name,
                ..
            }
            | Self::Secret {
                mount_path,
                volume_name,
                ..
            } => vec![VolumeMount::new(volume_name, mount_path)],
        }
    }

    /// Environment the mount needs inside the container
    pub fn env(&self) -> EnvironmentSet {
        let mut env = EnvironmentSet::new();
        if let Self::Network {
            username,
            access_key,
            ..
        } = self
        {
            env.set(ENV_NETWORK_USERNAME, username.as_str());
            env.set(ENV_NETWORK_ACCESS_KEY, access_key.as_str());
        }
        env
    }
}

/// Explicit PVC mount request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcArgs {
    /// Claim name
    pub claim_name: String,
    /// Mount path
    pub mount_path: String,
    /// Volume name (defaults to "pvc")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

impl PvcArgs {
    /// PVC args with the default volume name
    pub fn new(claim_name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            claim_name: claim_name.into(),
            mount_path: mount_path.into(),
            volume_name: None,
        }
    }

    /// Override the volume name
    pub fn with_volume_name(mut self, volume_name: impl Into<String>) -> Self {
        self.volume_name = Some(volume_name.into());
        self
    }
}

/// Outcome of mount auto-detection: zero or one network or PVC mount.
///
/// Secret mounts belong to secret backends and cannot be wrapped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountStrategy(Option<MountDescriptor>);

impl MountStrategy {
    /// No mount
    pub fn none() -> Self {
        Self(None)
    }

    /// The selected mount, if any
    pub fn descriptor(&self) -> Option<&MountDescriptor> {
        self.0.as_ref()
    }

    /// Take the selected mount
    pub fn into_descriptor(self) -> Option<MountDescriptor> {
        self.0
    }

    /// True when no mount was selected
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl TryFrom<MountDescriptor> for MountStrategy {
    /// The rejected secret mount
    type Error = MountDescriptor;

    fn try_from(mount: MountDescriptor) -> Result<Self, Self::Error> {
        match mount {
            MountDescriptor::Secret { .. } => Err(mount),
            mount => Ok(Self(Some(mount))),
        }
    }
}

/// Choose a mount from configuration and optional PVC args.
///
/// PVC args take precedence over network credentials. Without them a network
/// mount is selected only when both access key and username are present.
pub fn auto_mount(config: &NetworkMountConfig, pvc: Option<PvcArgs>) -> MountStrategy {
    if let Some(args) = pvc {
        let volume_name = args
            .volume_name
            .unwrap_or_else(|| DEFAULT_PVC_VOLUME_NAME.to_string());
        debug!(claim = %args.claim_name, volume = %volume_name, "selected pvc mount");
        return MountStrategy(Some(MountDescriptor::Pvc {
            claim_name: args.claim_name,
            mount_path: args.mount_path,
            volume_name,
        }));
    }

    match config.credentials() {
        Some((username, access_key)) => {
            debug!(username, "selected network mount");
            MountStrategy(Some(MountDescriptor::Network {
                username: username.to_string(),
                access_key: access_key.to_string(),
                driver: config.driver.clone(),
                container: config.container.clone(),
                mount_path: config.mount_path.clone(),
                user_mount_path: config.user_mount_path.clone(),
                volume_name: config.volume_name.clone(),
            }))
        }
        None => {
            debug!("no mount credentials or pvc args, skipping auto mount");
            MountStrategy::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_config() -> NetworkMountConfig {
        NetworkMountConfig {
            access_key: Some("1111-2222-3333-4444".to_string()),
            username: Some("test-user".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn secret_mounts_cannot_become_a_strategy() {
        let secret = MountDescriptor::Secret {
            volume_name: "v".into(),
            secret_name: "s".into(),
            mount_path: "/s".into(),
            default_mode: 420,
        };
        assert_eq!(MountStrategy::try_from(secret.clone()), Err(secret));

        let pvc = MountDescriptor::Pvc {
            claim_name: "c".into(),
            mount_path: "/c".into(),
            volume_name: "pvc".into(),
        };
        let strategy = MountStrategy::try_from(pvc.clone()).unwrap();
        assert_eq!(strategy.descriptor(), Some(&pvc));
    }

    #[test]
    fn network_mount_from_credentials() {
        let strategy = auto_mount(&network_config(), None);
        match strategy.descriptor() {
            Some(MountDescriptor::Network {
                username,
                access_key,
                ..
            }) => {
                assert_eq!(username, "test-user");
                assert_eq!(access_key, "1111-2222-3333-4444");
            }
            other => panic!("expected network mount, got {other:?}"),
        }
    }

    #[test]
    fn missing_credential_means_no_mount() {
        let config = NetworkMountConfig {
            username: Some("test-user".to_string()),
            ..Default::default()
        };
        assert!(auto_mount(&config, None).is_none());
        assert!(auto_mount(&NetworkMountConfig::default(), None).is_none());
    }

    #[test]
    fn pvc_args_win_over_credentials() {
        let pvc =
            PvcArgs::new("test-pvc", "/volume/mount/path").with_volume_name("test-volume-name");
        let strategy = auto_mount(&network_config(), Some(pvc));
        assert_eq!(
            strategy.into_descriptor(),
            Some(MountDescriptor::Pvc {
                claim_name: "test-pvc".to_string(),
                mount_path: "/volume/mount/path".to_string(),
                volume_name: "test-volume-name".to_string(),
            })
        );
    }

    #[test]
    fn pvc_volume_name_defaults() {
        let strategy = auto_mount(
            &NetworkMountConfig::default(),
            Some(PvcArgs::new("c", "/data")),
        );
        let mount = strategy.descriptor().unwrap();
        assert_eq!(mount.volumes()[0].name, DEFAULT_PVC_VOLUME_NAME);
        assert_eq!(mount.kind_name(), "pvc");
    }

    #[test]
    fn network_mount_renders_flex_volume_and_user_home() {
        let strategy = auto_mount(&network_config(), None);
        let mount = strategy.descriptor().unwrap();

        let volumes = mount.volumes();
        let flex = volumes[0].flex_volume.as_ref().unwrap();
        assert_eq!(flex.driver, "v3io/fuse");
        assert_eq!(
            flex.options.get("accessKey").map(String::as_str),
            Some("1111-2222-3333-4444")
        );

        let mounts = mount.volume_mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mount_path, "/v3io");
        assert_eq!(mounts[1].mount_path, "/User");
        assert_eq!(mounts[1].sub_path.as_deref(), Some("users/test-user"));

        let env = mount.env();
        assert_eq!(env.get_literal(ENV_NETWORK_USERNAME), Some("test-user"));
        assert_eq!(env.get_literal(ENV_NETWORK_ACCESS_KEY), Some("1111-2222-3333-4444"));
    }

    #[test]
    fn secret_mount_keeps_default_mode() {
        let mount = MountDescriptor::Secret {
            volume_name: "vault-secret".to_string(),
            secret_name: "test-secret".to_string(),
            mount_path: "/var/run/secrets/vault".to_string(),
            default_mode: 420,
        };
        let volumes = mount.volumes();
        let secret = volumes[0].secret.as_ref().unwrap();
        assert_eq!(secret.secret_name, "test-secret");
        assert_eq!(secret.default_mode, Some(420));
        assert!(mount.env().is_empty());
    }
}
