//! # genbench
//!
//! Harness for benchmarking LLM single-shot code generation against
//! executable task specifications.
//!
//! Each trial sends one task prompt to a model, extracts the first
//! plausible fenced code block from the reply, loads the artifact in an
//! isolated disposable runtime, and checks it against the task's
//! declarative cases. Nothing retries and nothing aborts the run: every
//! (model, task, attempt) triple yields exactly one immutable record,
//! and statistics are a pure fold over the completed record list.
//!
//! ## Pipeline
//!
//! ```text
//! Task definitions (JSON, one file per task)
//!        ↓
//! Prompt construction (service | component)
//!        ↓
//! Model call (OpenAI-compatible chat completions)
//!        ↓
//! Code extraction (fenced blocks, shape-scored)
//!        ↓
//! Artifact load (fresh subprocess per attempt)
//!        ↓
//! Declarative validation (equals / contains / hasProps | HTML checks)
//!        ↓
//! Aggregation (success %, avg latency, unbiased pass@k)
//!        ↓
//! Report (summary.json + console tables)
//! ```

pub mod client;
pub mod config;
pub mod extract;
pub mod loader;
pub mod prompt;
pub mod report;
pub mod runner;
pub mod stats;
pub mod task;
pub mod validate;

pub use client::{ClientError, HttpModelClient, ModelEntry, ModelInvoker};
pub use config::RunConfig;
pub use extract::extract_code;
pub use loader::{
    ArtifactLoader, ComponentHandle, HostError, LoadedArtifact, LoaderConfig, ServiceHandle,
    ServiceRequest, ServiceResponse,
};
pub use prompt::build_prompt;
pub use report::{
    stats_table, trial_table, AttemptDetail, FsReporter, NullSink, RunSink, RunSummary,
};
pub use runner::{RoundRunner, Stage, TrialRecord, TrialStatus};
pub use stats::{effective_ks, pass_at_k, Aggregator, ModelStats, RollupStats, TaskStats};
pub use task::{Difficulty, Task, TaskError, TaskKind, TaskSet};
pub use validate::{validate_component, validate_service, CaseResult, ValidationResult};
