//! Trial execution engine.
//!
//! Drives one (model × task × attempt) trial end to end: prompt, model call,
//! code extraction, artifact persistence, isolated load, declarative
//! validation. Every stage is tagged so any failure is attributable, and no
//! failure aborts the run: each attempt yields exactly one immutable
//! `TrialRecord` and the loop moves on. Execution is strictly sequential,
//! one model call in flight, one artifact load at a time.

use crate::client::{ModelEntry, ModelInvoker};
use crate::config::RunConfig;
use crate::extract::extract_code;
use crate::loader::{ArtifactLoader, LoaderConfig};
use crate::prompt::build_prompt;
use crate::report::{AttemptDetail, RunSink};
use crate::task::{Difficulty, Task, TaskKind, TaskSet};
use crate::validate::{validate_component, validate_service, ValidationResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Pipeline stage of one attempt, used to classify failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Model invocation
    Call,
    /// Code-block extraction
    Extract,
    /// Artifact persistence
    Write,
    /// Artifact load in a fresh host
    Load,
    /// Declarative validation
    Validate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Extract => write!(f, "extract"),
            Self::Write => write!(f, "write"),
            Self::Load => write!(f, "load"),
            Self::Validate => write!(f, "validate"),
        }
    }
}

/// Terminal status of one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Error,
}

/// One immutable outcome for a (model, task, attempt) triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Model name the attempt ran against
    pub model: String,
    /// Task identifier (grouping key, stable across attempts)
    pub task_id: String,
    /// Attempt number, starting at 1
    pub attempt: usize,
    /// Terminal status; validation failure is an error with a message
    pub status: TrialStatus,
    /// Whether validation ran and every case passed
    pub passed: bool,
    /// Wall clock from call start to terminal stage
    pub duration_ms: u64,
    /// Stage the attempt terminated in
    pub stage: Stage,
    /// Failure message, when status is error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Difficulty tier of the task
    pub difficulty: Difficulty,
    /// Where the extracted artifact was persisted, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

struct StageFailure {
    stage: Stage,
    message: String,
}

impl StageFailure {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Sequential trial runner over models × tasks × attempts
pub struct RoundRunner<'a> {
    config: RunConfig,
    loader: ArtifactLoader,
    invoker: &'a dyn ModelInvoker,
}

impl<'a> RoundRunner<'a> {
    /// Create a runner wired to a model-invocation collaborator
    #[must_use]
    pub fn new(config: RunConfig, invoker: &'a dyn ModelInvoker) -> Self {
        let loader = ArtifactLoader::with_config(LoaderConfig {
            node_command: config.node_command.clone(),
            module_root: config.module_root.clone(),
        });
        Self {
            config,
            loader,
            invoker,
        }
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every attempt for every (model, task) pair, in order, emitting
    /// one record per attempt. A malformed task is skipped with a warning;
    /// every other failure is attempt-scoped.
    pub fn run(
        &self,
        models: &[ModelEntry],
        tasks: &TaskSet,
        sink: &mut dyn RunSink,
    ) -> Vec<TrialRecord> {
        let mut records = Vec::with_capacity(models.len() * tasks.len() * self.config.rounds);

        for model in models {
            for task in tasks {
                if let Err(e) = task.check() {
                    tracing::warn!(task = %task.id, error = %e, "skipping malformed task");
                    continue;
                }
                for attempt in 1..=self.config.rounds {
                    let record = self.run_attempt(model, task, attempt, sink);
                    tracing::info!(
                        model = %record.model,
                        task = %record.task_id,
                        attempt,
                        passed = record.passed,
                        stage = %record.stage,
                        duration_ms = record.duration_ms,
                        "attempt finished"
                    );
                    records.push(record);
                }
            }
        }

        records
    }

    /// Drive a single attempt through its stages.
    pub fn run_attempt(
        &self,
        model: &ModelEntry,
        task: &Task,
        attempt: usize,
        sink: &mut dyn RunSink,
    ) -> TrialRecord {
        let started = Instant::now();
        let mut artifact_path = None;
        let mut validation = None;

        let outcome = self.try_attempt(model, task, attempt, &mut artifact_path, &mut validation);

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let record = match outcome {
            Ok(()) => TrialRecord {
                model: model.name.clone(),
                task_id: task.id.clone(),
                attempt,
                status: TrialStatus::Ok,
                passed: true,
                duration_ms,
                stage: Stage::Validate,
                error: None,
                difficulty: task.difficulty(),
                artifact_path,
            },
            Err(failure) => TrialRecord {
                model: model.name.clone(),
                task_id: task.id.clone(),
                attempt,
                status: TrialStatus::Error,
                passed: false,
                duration_ms,
                stage: failure.stage,
                error: Some(failure.message),
                difficulty: task.difficulty(),
                artifact_path,
            },
        };

        let detail = AttemptDetail {
            task_id: record.task_id.clone(),
            attempt,
            model: record.model.clone(),
            stage: record.stage,
            validation,
            error: record.error.clone(),
        };
        if let Err(e) = sink.on_attempt(&detail) {
            tracing::warn!(error = %e, "failed to persist attempt detail");
        }

        record
    }

    fn try_attempt(
        &self,
        model: &ModelEntry,
        task: &Task,
        attempt: usize,
        artifact_path: &mut Option<PathBuf>,
        validation: &mut Option<ValidationResult>,
    ) -> Result<(), StageFailure> {
        let prompt = build_prompt(task);

        let raw = self
            .invoker
            .invoke(&model.model, &prompt)
            .map_err(|e| StageFailure::new(Stage::Call, e.to_string()))?;

        let code = extract_code(&raw)
            .ok_or_else(|| StageFailure::new(Stage::Extract, "No code block found"))?;

        let path = self.persist_artifact(model, task, attempt, &code)?;
        *artifact_path = Some(path);

        let mut artifact = self
            .loader
            .load(&code)
            .map_err(|e| StageFailure::new(Stage::Load, e.to_string()))?;

        let result = match task.kind {
            TaskKind::Service => {
                // Task invariant is checked before any attempt runs.
                let spec = task
                    .endpoint
                    .as_ref()
                    .ok_or_else(|| StageFailure::new(Stage::Validate, "Task missing endpoint config"))?;
                validate_service(&mut artifact, spec)
            }
            TaskKind::Component => {
                let spec = task
                    .component
                    .as_ref()
                    .ok_or_else(|| StageFailure::new(Stage::Validate, "Task missing component config"))?;
                validate_component(&mut artifact, spec)
            }
        };

        let all_passed = result.all_passed;
        let failed = result.failed_indices();
        *validation = Some(result);

        if !all_passed {
            let indices = failed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(StageFailure::new(
                Stage::Validate,
                format!("Validation failed for cases [{indices}]"),
            ));
        }

        Ok(())
    }

    /// Persist the extracted code under `<out>/<model>/<task>_r<attempt>.js`.
    fn persist_artifact(
        &self,
        model: &ModelEntry,
        task: &Task,
        attempt: usize,
        code: &str,
    ) -> Result<PathBuf, StageFailure> {
        let dir = self.config.out_dir.join(&model.name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageFailure::new(Stage::Write, e.to_string()))?;
        let path = dir.join(format!("{}_r{attempt}.js", task.id));
        std::fs::write(&path, code).map_err(|e| StageFailure::new(Stage::Write, e.to_string()))?;
        Ok(path)
    }
}
