//! RunCompiler: orchestrates compilation of a Runtime + Task
//!
//! Stages run in a fixed order:
//! resources → mounts → secrets → code → environment → assembly.
//! The runtime spec is cloned up front, so the caller's runtime is never
//! touched and later edits to it cannot leak into a compiled run.
//!
//! Compilation has no side effects on the cluster. Inline secret values are
//! staged on the [`CompiledRun`] and written only by [`RunCompiler::submit`].

use std::fmt;

use runspec_common::{
    CompilerConfig, DEFAULT_PROJECT, ENV_EXEC_CODE, ENV_EXEC_CONFIG, LABEL_CLASS,
    LABEL_MANAGED_BY, LABEL_MANAGED_BY_RUNSPEC, LABEL_NAME, LABEL_PROJECT, LABEL_TASK,
};
use runspec_secrets::{ResolveContext, SecretReference, SecretResolver, StagedSecrets};
use runspec_workload::{CodePayload, EnvironmentSet, MountDescriptor};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::descriptor::{RunMetadata, RunPayload, WorkloadDescriptor};
use crate::error::RunError;
use crate::runtime::Runtime;
use crate::submit::{ClusterSubmitter, SubmissionHandle};
use crate::task::Task;

/// Runtime class recorded on every run
const RUNTIME_CLASS: &str = "job";

/// Max length of a Kubernetes object name
const MAX_NAME_LEN: usize = 63;

/// Max length of a label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Hex characters of the uid appended to the run name
const UID_SUFFIX_LEN: usize = 8;

/// Compilation stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompileStage {
    Resources,
    Mounts,
    Secrets,
    Code,
    Environment,
    Assembly,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resources => "resources",
            Self::Mounts => "mounts",
            Self::Secrets => "secrets",
            Self::Code => "code",
            Self::Environment => "environment",
            Self::Assembly => "assembly",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a run request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Draft,
    Compiled,
    Submitted,
    Acknowledged,
    Rejected,
}

/// What the compiler had done when something went wrong
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageContext {
    /// Last stage that completed
    pub stage: CompileStage,
    /// Runtime mount kind, if any
    pub mount_kind: Option<&'static str>,
    /// Secret kinds resolved, in declaration order
    pub secret_kinds: Vec<String>,
}

impl StageContext {
    pub fn new(stage: CompileStage) -> Self {
        Self {
            stage,
            mount_kind: None,
            secret_kinds: Vec::new(),
        }
    }
}

impl fmt::Display for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage={}, mount={}, secrets=[{}]",
            self.stage,
            self.mount_kind.unwrap_or("none"),
            self.secret_kinds.join(",")
        )
    }
}

/// A compiled run awaiting submission
#[derive(Clone, Debug)]
pub struct CompiledRun {
    descriptor: WorkloadDescriptor,
    context: StageContext,
    staged: Vec<StagedSecrets>,
}

impl CompiledRun {
    pub fn phase(&self) -> RunPhase {
        RunPhase::Compiled
    }

    pub fn descriptor(&self) -> &WorkloadDescriptor {
        &self.descriptor
    }

    /// Secret stores written when the run is submitted
    pub fn staged_secrets(&self) -> &[StagedSecrets] {
        &self.staged
    }

    pub fn into_descriptor(self) -> WorkloadDescriptor {
        self.descriptor
    }
}

/// An acknowledged submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub handle: SubmissionHandle,
    pub phase: RunPhase,
}

/// Compiles runs and hands them to a cluster submitter.
///
/// Holds only configuration and `Arc`'d secret backends, so one compiler can
/// serve concurrent compilations.
///
/// ```rust,ignore
/// let compiler = RunCompiler::new(config, resolver);
/// let compiled = compiler.compile(&runtime, &task).await?;
/// let submission = compiler.submit(compiled, &submitter).await?;
/// ```
#[derive(Debug)]
pub struct RunCompiler {
    config: CompilerConfig,
    secrets: SecretResolver,
}

impl RunCompiler {
    pub fn new(config: CompilerConfig, secrets: SecretResolver) -> Self {
        Self { config, secrets }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a runtime and task into a workload descriptor
    #[instrument(skip_all, fields(runtime = %runtime.metadata.name, task = %task.metadata.name))]
    pub async fn compile(&self, runtime: &Runtime, task: &Task) -> Result<CompiledRun, RunError> {
        let spec = runtime.spec.clone();
        let uid = Uuid::new_v4().simple().to_string();
        let name = run_name(&runtime.metadata.name, &uid);
        let project = task
            .metadata
            .project
            .clone()
            .or_else(|| runtime.metadata.project.clone())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        let namespace = self.config.namespace.clone();

        // Resources
        spec.resources
            .validate()
            .map_err(RunError::at(CompileStage::Resources))?;
        let mut context = StageContext::new(CompileStage::Resources);
        debug!(stage = %context.stage, "stage complete");

        // Mounts
        let mut mounts: Vec<MountDescriptor> = Vec::new();
        let mut mount_env = EnvironmentSet::new();
        if let Some(ref mount) = spec.mount {
            mount_env = mount.env();
            context.mount_kind = Some(mount.kind_name());
            mounts.push(mount.clone());
        }
        context.stage = CompileStage::Mounts;
        debug!(stage = %context.stage, mount = ?context.mount_kind, "stage complete");

        // Secrets
        let resolve_ctx = ResolveContext {
            project: project.clone(),
            run_name: name.clone(),
            namespace: namespace.clone(),
        };
        let mut secret_env = EnvironmentSet::new();
        let mut secret_refs: Vec<SecretReference> = Vec::new();
        let mut staged: Vec<StagedSecrets> = Vec::new();
        for declaration in &task.spec.secret_sources {
            let resolution = self.secrets.resolve(declaration, &resolve_ctx).await?;
            secret_env.extend(resolution.env);
            if let Some(mount) = resolution.mount {
                push_mount(&mut mounts, mount);
            }
            if let Some(stage) = resolution.staged {
                push_staged(&mut staged, stage);
            }
            secret_refs.push(resolution.reference);
            context.secret_kinds.push(declaration.kind.clone());
        }
        context.stage = CompileStage::Secrets;
        debug!(stage = %context.stage, kinds = ?context.secret_kinds, "stage complete");

        // Code
        let code = spec
            .code
            .as_deref()
            .map(|body| CodePayload::package(body, self.config.code.max_payload_bytes))
            .transpose()
            .map_err(RunError::at(CompileStage::Code))?;
        context.stage = CompileStage::Code;

        // Environment
        let payload = RunPayload {
            metadata: RunMetadata {
                name: task.metadata.name.clone(),
                project: project.clone(),
                labels: task.metadata.labels.clone(),
            },
            params: task.spec.params.clone(),
            inputs: task.spec.inputs.clone(),
            hyperparams: task.spec.hyperparams.clone(),
            hyper_param_options: task.spec.hyper_param_options.clone(),
            secret_refs: secret_refs.clone(),
        };
        let mut injected = EnvironmentSet::new();
        injected.set(ENV_EXEC_CONFIG, serde_json::to_string(&payload)?);
        injected.extend(mount_env);
        injected.extend(secret_env);
        if let Some(ref code) = code {
            injected.set(ENV_EXEC_CODE, code.encoded.as_str());
        }
        for (key, _) in spec.env.iter().filter(|(k, _)| injected.contains(k)) {
            debug!(env = key, "user env overrides injected value");
        }
        let env = EnvironmentSet::compose(injected, &spec.env);
        context.stage = CompileStage::Environment;

        // Assembly
        let mut labels = runtime.metadata.labels.clone();
        labels.extend(task.metadata.labels.clone());
        labels.insert(LABEL_NAME.to_string(), runtime.metadata.name.clone());
        labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_RUNSPEC.to_string());
        labels.insert(LABEL_PROJECT.to_string(), project);
        labels.insert(LABEL_CLASS.to_string(), RUNTIME_CLASS.to_string());
        if !task.metadata.name.is_empty() {
            labels.insert(LABEL_TASK.to_string(), task.metadata.name.clone());
        }
        let labels = labels
            .into_iter()
            .map(|(key, value)| (key, sanitize_label_value(&value)))
            .collect();

        let command = if spec.command.is_empty() {
            self.config.exec_command.clone()
        } else {
            spec.command
        };

        let descriptor = WorkloadDescriptor {
            uid,
            name,
            namespace,
            image: spec.image,
            command,
            args: spec.args,
            code,
            env,
            resources: spec.resources,
            mounts,
            secret_refs,
            labels,
            service_account: spec
                .service_account
                .or_else(|| self.config.service_account.clone()),
            node_selector: spec.node_selector,
            image_pull_policy: spec.image_pull_policy,
            run: payload,
        };
        context.stage = CompileStage::Assembly;

        info!(
            run = %descriptor.name,
            uid = %descriptor.uid,
            phase = ?RunPhase::Compiled,
            "compiled run"
        );
        Ok(CompiledRun {
            descriptor,
            context,
            staged,
        })
    }

    /// Submit a compiled run.
    ///
    /// Staged secret stores are written first. They are removed again if a
    /// write fails or the cluster rejects the workload.
    #[instrument(skip_all, fields(run = %compiled.descriptor.name))]
    pub async fn submit(
        &self,
        compiled: CompiledRun,
        submitter: &dyn ClusterSubmitter,
    ) -> Result<Submission, RunError> {
        for (i, stage) in compiled.staged.iter().enumerate() {
            if let Err(e) = stage.commit().await {
                discard_all(&compiled.staged[..i]).await;
                return Err(e.into());
            }
        }

        debug!(phase = ?RunPhase::Submitted, "submitting run");
        match submitter.submit(&compiled.descriptor).await {
            Ok(handle) => {
                info!(
                    name = %handle.name,
                    namespace = %handle.namespace,
                    phase = ?RunPhase::Acknowledged,
                    "run acknowledged"
                );
                Ok(Submission {
                    handle,
                    phase: RunPhase::Acknowledged,
                })
            }
            Err(source) => {
                warn!(
                    error = %source,
                    context = %compiled.context,
                    phase = ?RunPhase::Rejected,
                    "run rejected"
                );
                discard_all(&compiled.staged).await;
                Err(RunError::SubmissionRejected {
                    context: compiled.context,
                    source,
                })
            }
        }
    }

    /// Compile and submit
    pub async fn run(
        &self,
        runtime: &Runtime,
        task: &Task,
        submitter: &dyn ClusterSubmitter,
    ) -> Result<Submission, RunError> {
        let compiled = self.compile(runtime, task).await?;
        self.submit(compiled, submitter).await
    }
}

/// Add a mount unless an identical one is present; conflicting volume names keep the first
fn push_mount(mounts: &mut Vec<MountDescriptor>, mount: MountDescriptor) {
    if mounts.contains(&mount) {
        return;
    }
    let names: Vec<String> = mount.volumes().into_iter().map(|v| v.name).collect();
    let taken = mounts
        .iter()
        .flat_map(MountDescriptor::volumes)
        .any(|v| names.contains(&v.name));
    if taken {
        warn!(volumes = ?names, "volume name already mounted, skipping");
        return;
    }
    mounts.push(mount);
}

/// Remove committed stores after a failed submission
async fn discard_all(staged: &[StagedSecrets]) {
    for stage in staged {
        if let Err(e) = stage.discard().await {
            warn!(store = %stage.store(), error = %e, "failed to remove staged secret store");
        }
    }
}

/// Fold stages bound for the same store so one write carries every key
fn push_staged(staged: &mut Vec<StagedSecrets>, stage: StagedSecrets) {
    match staged.iter().position(|s| s.same_target(&stage)) {
        Some(i) => staged[i].merge(stage),
        None => staged.push(stage),
    }
}

/// Coerce a value into label syntax: `[A-Za-z0-9._-]`, alphanumeric at both
/// ends, at most 63 characters
fn sanitize_label_value(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let edge = |c: char| !c.is_ascii_alphanumeric();
    let trimmed = sanitized.trim_matches(edge);
    if trimmed.len() > MAX_LABEL_VALUE_LEN {
        trimmed[..MAX_LABEL_VALUE_LEN].trim_end_matches(edge).to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<base>-<uid prefix>`, lowercased and kept within the object name limit
fn run_name(base: &str, uid: &str) -> String {
    let suffix = &uid[..UID_SUFFIX_LEN.min(uid.len())];
    let sanitized: String = base
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let max_base = MAX_NAME_LEN - suffix.len() - 1;
    let trimmed = sanitized[..sanitized.len().min(max_base)].trim_matches('-');
    if trimmed.is_empty() {
        format!("run-{suffix}")
    } else {
        format!("{trimmed}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::{MockClusterSubmitter, SubmitError};

    fn compiler() -> RunCompiler {
        RunCompiler::new(CompilerConfig::default(), SecretResolver::new())
    }

    #[test]
    fn run_names_are_dns_safe() {
        assert_eq!(run_name("My_Func", "abcdef0123456789"), "my-func-abcdef01");
        assert_eq!(run_name("", "abcdef0123"), "run-abcdef01");
        let long = "a".repeat(80);
        assert!(run_name(&long, "abcdef0123").len() <= MAX_NAME_LEN);
    }

    #[test]
    fn label_values_are_coerced() {
        assert_eq!(sanitize_label_value("My Func"), "My-Func");
        assert_eq!(sanitize_label_value("v1.2_rc"), "v1.2_rc");
        assert_eq!(sanitize_label_value("-_edge._"), "edge");
        assert_eq!(sanitize_label_value("ünïcode"), "n-code");
        assert_eq!(sanitize_label_value(""), "");
        let long = format!("{}-{}", "a".repeat(62), "b".repeat(10));
        let value = sanitize_label_value(&long);
        assert_eq!(value, "a".repeat(62));
    }

    #[test]
    fn stage_context_display() {
        let ctx = StageContext {
            stage: CompileStage::Assembly,
            mount_kind: Some("pvc"),
            secret_kinds: vec!["inline".into(), "vault".into()],
        };
        assert_eq!(ctx.to_string(), "stage=assembly, mount=pvc, secrets=[inline,vault]");
    }

    #[tokio::test]
    async fn default_command_and_exec_config() {
        let runtime = Runtime::new("fn", "img");
        let task = Task::new("t").with_param("p", 1);
        let compiled = compiler().compile(&runtime, &task).await.unwrap();
        let d = compiled.descriptor();

        assert_eq!(compiled.phase(), RunPhase::Compiled);
        assert_eq!(d.command, CompilerConfig::default().exec_command);
        assert_eq!(d.labels.get(LABEL_PROJECT).map(String::as_str), Some(DEFAULT_PROJECT));
        let payload: RunPayload =
            serde_json::from_str(d.env.get_literal(ENV_EXEC_CONFIG).unwrap()).unwrap();
        assert_eq!(payload.params["p"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn invalid_resources_fail_in_resources_stage() {
        let mut runtime = Runtime::new("fn", "img");
        runtime.spec.resources.limits.gpus = Some(2);
        let err = compiler().compile(&runtime, &Task::new("t")).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Compilation {
                stage: CompileStage::Resources,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn acknowledged_submission() {
        let compiled = compiler()
            .compile(&Runtime::new("fn", "img"), &Task::new("t"))
            .await
            .unwrap();
        let name = compiled.descriptor().name.clone();

        let mut submitter = MockClusterSubmitter::new();
        submitter
            .expect_submit()
            .times(1)
            .returning(|d| Ok(SubmissionHandle::for_descriptor(d)));

        let submission = compiler().submit(compiled, &submitter).await.unwrap();
        assert_eq!(submission.phase, RunPhase::Acknowledged);
        assert_eq!(submission.handle.name, name);
    }

    #[tokio::test]
    async fn rejection_carries_stage_context() {
        let compiled = compiler()
            .compile(&Runtime::new("fn", "img"), &Task::new("t"))
            .await
            .unwrap();

        let mut submitter = MockClusterSubmitter::new();
        submitter.expect_submit().returning(|_| {
            Err(SubmitError::Rejected {
                message: "quota exceeded".into(),
            })
        });

        match compiler().submit(compiled, &submitter).await {
            Err(RunError::SubmissionRejected { context, source }) => {
                assert_eq!(context.stage, CompileStage::Assembly);
                assert!(context.mount_kind.is_none());
                assert!(source.to_string().contains("quota exceeded"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_mounts_are_collapsed() {
        let vault = MountDescriptor::Secret {
            volume_name: "vault-secret".into(),
            secret_name: "tok".into(),
            mount_path: "/var/run/secrets/vault".into(),
            default_mode: 420,
        };
        let mut mounts = vec![vault.clone()];
        push_mount(&mut mounts, vault);
        push_mount(
            &mut mounts,
            MountDescriptor::Secret {
                volume_name: "vault-secret".into(),
                secret_name: "other".into(),
                mount_path: "/other".into(),
                default_mode: 420,
            },
        );
        assert_eq!(mounts.len(), 1);
    }
}
