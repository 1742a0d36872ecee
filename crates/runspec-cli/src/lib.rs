//! runspec CLI library

pub mod error;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::info;

use runspec_common::CompilerConfig;
use runspec_job::{KubeSubmitter, RunCompiler, Runtime, Task, WorkloadDescriptor};
use runspec_secrets::{
    InMemorySecretStore, InlineBackend, KubeIdentityLookup, KubeSecretStore, SecretResolver,
    VaultBackend,
};
use runspec_workload::{auto_mount, PvcArgs};

/// runspec - compile runtimes and tasks into cluster workloads
#[derive(Parser, Debug)]
#[command(name = "runspec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Compiler configuration file (YAML)
    #[arg(long, env = "RUNSPEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Runtime definition (YAML)
    #[arg(long)]
    pub runtime: PathBuf,

    /// Task definition (YAML)
    #[arg(long)]
    pub task: PathBuf,

    /// Submit to the cluster instead of printing the descriptor
    #[arg(long)]
    pub submit: bool,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,

    /// Auto-detect a network or PVC mount before compiling
    #[arg(long)]
    pub auto_mount: bool,

    /// PVC claim to mount (with --auto-mount)
    #[arg(long, requires = "pvc_mount_path")]
    pub pvc_claim: Option<String>,

    /// Mount path for the PVC
    #[arg(long, requires = "pvc_claim")]
    pub pvc_mount_path: Option<String>,

    /// Volume name for the PVC
    #[arg(long, requires = "pvc_claim")]
    pub pvc_volume_name: Option<String>,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = match self.config {
            Some(ref path) => CompilerConfig::from_file(path)?,
            None => CompilerConfig::default(),
        }
        .apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        let mut runtime: Runtime = read_yaml(&self.runtime)?;
        let task: Task = read_yaml(&self.task)?;

        if self.auto_mount {
            let pvc = self.pvc_args();
            runtime.apply(auto_mount(&config.network_mount, pvc));
        }

        if self.submit {
            submit(config, &runtime, &task).await
        } else {
            let descriptor = dry_run(config, &runtime, &task).await?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(())
        }
    }

    fn pvc_args(&self) -> Option<PvcArgs> {
        let claim = self.pvc_claim.as_ref()?;
        let path = self.pvc_mount_path.as_ref()?;
        let args = PvcArgs::new(claim, path);
        Some(match self.pvc_volume_name {
            Some(ref name) => args.with_volume_name(name),
            None => args,
        })
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Compile without a cluster: inline secrets are staged but never written, vault is unavailable
pub async fn dry_run(
    config: CompilerConfig,
    runtime: &Runtime,
    task: &Task,
) -> Result<WorkloadDescriptor> {
    let store = Arc::new(InMemorySecretStore::new());
    let resolver = SecretResolver::new().with_backend(Arc::new(InlineBackend::new(store)));
    let compiler = RunCompiler::new(config, resolver);
    let compiled = compiler.compile(runtime, task).await?;
    Ok(compiled.into_descriptor())
}

async fn submit(config: CompilerConfig, runtime: &Runtime, task: &Task) -> Result<()> {
    let client = kube::Client::try_default().await?;

    let lookup = KubeIdentityLookup::new(client.clone(), &config.namespace, config.vault.clone());
    let resolver = SecretResolver::new()
        .with_backend(Arc::new(InlineBackend::new(Arc::new(KubeSecretStore::new(
            client.clone(),
        )))))
        .with_backend(Arc::new(VaultBackend::new(
            Arc::new(lookup),
            config.vault.clone(),
            config.secret_file_mode,
        )));

    let compiler = RunCompiler::new(config, resolver);
    let submitter = KubeSubmitter::new(client);
    let submission = compiler.run(runtime, task, &submitter).await?;
    let state = submitter.observe(&submission.handle).await?;

    info!(
        name = %submission.handle.name,
        namespace = %submission.handle.namespace,
        uid = %submission.handle.uid,
        state = ?state,
        "run submitted"
    );
    println!("{}", serde_json::to_string_pretty(&submission.handle)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runspec_common::{ENV_EXEC_CONFIG, NetworkMountConfig};

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "runspec",
            "--runtime",
            "rt.yaml",
            "--task",
            "task.yaml",
            "--auto-mount",
            "--pvc-claim",
            "data",
            "--pvc-mount-path",
            "/data",
        ])
        .unwrap();
        assert!(!cli.submit);
        assert!(cli.auto_mount);
        let pvc = cli.pvc_args().unwrap();
        assert_eq!(pvc.claim_name, "data");
        assert!(pvc.volume_name.is_none());
    }

    #[test]
    fn pvc_claim_requires_mount_path() {
        let res = Cli::try_parse_from([
            "runspec",
            "--runtime",
            "rt.yaml",
            "--task",
            "task.yaml",
            "--pvc-claim",
            "data",
        ]);
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn dry_run_compiles_inline_secrets() {
        let runtime = Runtime::new("fn", "img");
        let task = Task::new("t").with_secrets("inline", serde_json::json!({ "k": "v" }));
        let d = dry_run(CompilerConfig::default(), &runtime, &task).await.unwrap();
        assert!(d.env.contains(ENV_EXEC_CONFIG));
        assert_eq!(d.secret_refs.len(), 1);
        assert!(!serde_json::to_string(&d).unwrap().contains("\"v\""));
    }

    #[tokio::test]
    async fn dry_run_has_no_vault_backend() {
        let task = Task::new("t").with_secrets("vault", serde_json::json!(["a"]));
        let err = dry_run(CompilerConfig::default(), &Runtime::new("fn", "img"), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Run(_)));
    }

    #[test]
    fn env_overrides_feed_auto_mount() {
        let config = CompilerConfig::default().apply_env_overrides(|key| match key {
            "V3IO_ACCESS_KEY" => Some("key".to_string()),
            "V3IO_USERNAME" => Some("user".to_string()),
            _ => None,
        });
        let mut runtime = Runtime::new("fn", "img");
        runtime.apply(auto_mount(&config.network_mount, None));
        assert!(runtime.spec.mount.is_some());
        assert_ne!(config.network_mount, NetworkMountConfig::default());
    }
}
