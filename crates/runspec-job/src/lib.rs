//! Run specification compiler
//!
//! Compiles a [`Runtime`] and a [`Task`] into an immutable
//! [`WorkloadDescriptor`] and hands it to a [`ClusterSubmitter`].

pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod runtime;
pub mod submit;
pub mod task;

pub use compiler::{CompileStage, CompiledRun, RunCompiler, RunPhase, StageContext, Submission};
pub use descriptor::{RunMetadata, RunPayload, WorkloadDescriptor};
pub use error::{ErrorKind, RunError};
pub use runtime::{Metadata, Runtime, RuntimeSpec};
pub use submit::{ClusterSubmitter, ExecutionState, KubeSubmitter, SubmissionHandle, SubmitError};
pub use task::{HyperParamOptions, Task, TaskSpec};
