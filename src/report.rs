//! Result persistence and reporting.
//!
//! The persistence collaborator receives one detail record after every
//! attempt and one summary object after the full run. The filesystem
//! reporter writes both as JSON under the output directory and renders
//! console tables; tests swap in collecting or null sinks.

use crate::runner::{Stage, TrialRecord, TrialStatus};
use crate::stats::ModelStats;
use crate::validate::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// Per-attempt detail record handed to the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptDetail {
    /// Task identifier
    pub task_id: String,
    /// Attempt number, starting at 1
    pub attempt: usize,
    /// Model name
    pub model: String,
    /// Stage the attempt terminated in
    pub stage: Stage,
    /// Validation outcome, when validation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Failure message, when the attempt errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// End-of-run summary object covering every attempted triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the summary was produced
    pub generated_at: DateTime<Utc>,
    /// Attempt rounds per (model, task) pair
    pub rounds: usize,
    /// pass@k values as requested
    pub requested_ks: Vec<usize>,
    /// pass@k values actually derived
    pub effective_ks: Vec<usize>,
    /// The full flat trial record list, in execution order
    pub results: Vec<TrialRecord>,
    /// Derived statistics per model
    pub stats: BTreeMap<String, ModelStats>,
}

/// Sink for attempt details; the runner reports every attempt through this
pub trait RunSink {
    /// Receive one attempt detail record.
    ///
    /// # Errors
    ///
    /// Returns an error when persistence fails; the runner logs and
    /// continues.
    fn on_attempt(&mut self, detail: &AttemptDetail) -> io::Result<()>;
}

/// Sink that drops everything (tests, dry runs)
pub struct NullSink;

impl RunSink for NullSink {
    fn on_attempt(&mut self, _detail: &AttemptDetail) -> io::Result<()> {
        Ok(())
    }
}

/// Filesystem reporter: detail records per attempt, summary at the end
pub struct FsReporter {
    out_dir: PathBuf,
}

impl FsReporter {
    /// Create a reporter rooted at `out_dir`
    #[must_use]
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    /// Write the run summary to `<out>/summary.json`.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or file cannot be written.
    pub fn write_summary(&self, summary: &RunSummary) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("summary.json");
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), "summary written");
        Ok(path)
    }
}

impl RunSink for FsReporter {
    fn on_attempt(&mut self, detail: &AttemptDetail) -> io::Result<()> {
        let dir = self.out_dir.join(&detail.model);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}_r{}.detail.json", detail.task_id, detail.attempt));
        let json = serde_json::to_string_pretty(detail)?;
        std::fs::write(path, json)
    }
}

#[derive(Tabled)]
struct TrialRow {
    model: String,
    task: String,
    attempt: usize,
    status: &'static str,
    stage: String,
    ms: u64,
}

#[derive(Tabled)]
struct StatRow {
    model: String,
    task: String,
    difficulty: String,
    attempts: u32,
    percent: f64,
    avg_ms: u64,
    pass_at: String,
}

/// Render the per-attempt outcome table
#[must_use]
pub fn trial_table(records: &[TrialRecord]) -> String {
    let rows: Vec<TrialRow> = records
        .iter()
        .map(|r| TrialRow {
            model: r.model.clone(),
            task: r.task_id.clone(),
            attempt: r.attempt,
            status: match r.status {
                TrialStatus::Ok => "ok",
                TrialStatus::Error => "error",
            },
            stage: r.stage.to_string(),
            ms: r.duration_ms,
        })
        .collect();
    Table::new(rows).to_string()
}

/// Render the per-(model, task) statistics table
#[must_use]
pub fn stats_table(stats: &BTreeMap<String, ModelStats>) -> String {
    let mut rows = Vec::new();
    for (model, model_stats) in stats {
        for (task_id, task_stats) in &model_stats.tasks {
            let pass_at = task_stats
                .derived
                .pass_at
                .iter()
                .map(|(k, v)| format!("pass@{k}={v}%"))
                .collect::<Vec<_>>()
                .join(" ");
            rows.push(StatRow {
                model: model.clone(),
                task: task_id.clone(),
                difficulty: task_stats.difficulty.to_string(),
                attempts: task_stats.raw.attempts,
                percent: task_stats.derived.percent,
                avg_ms: task_stats.derived.avg_ms,
                pass_at,
            });
        }
    }
    Table::new(rows).to_string()
}

impl RunSummary {
    /// Assemble the summary object from the completed run.
    #[must_use]
    pub fn build(
        rounds: usize,
        requested_ks: Vec<usize>,
        effective_ks: Vec<usize>,
        results: Vec<TrialRecord>,
        stats: BTreeMap<String, ModelStats>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            rounds,
            requested_ks,
            effective_ks,
            results,
            stats,
        }
    }
}
