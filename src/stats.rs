//! Statistical aggregation of trial outcomes.
//!
//! Provides pass@k, the unbiased estimator for functional correctness of
//! code-generation models (Chen et al., 2021 "Evaluating Large Language
//! Models Trained on Code"), and the batch fold from a flat trial record
//! list into per-(model, task) statistics with family and difficulty rollups.
//!
//! Derived values are always recomputed from the raw counters; nothing is
//! patched incrementally, so re-aggregating an unchanged record list yields
//! identical output.

use crate::runner::TrialRecord;
use crate::task::Difficulty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compute pass@k: the probability that at least one of `k` attempts drawn
/// without replacement from `n` observed attempts (of which `c` succeeded)
/// passes.
///
/// Formula: `1 - C(n-c, k) / C(n, k)`, evaluated via the incremental product
/// `1 - prod_{i=0..kk} (n-c-i) / (n-i)` with `kk = min(k, n)` to avoid
/// binomial overflow for large `n`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pass_at_k(n: usize, c: usize, k: usize) -> f64 {
    if n == 0 || k == 0 || c == 0 {
        return 0.0;
    }
    if c >= n {
        return 1.0;
    }

    let kk = k.min(n);
    if kk > n - c {
        // Fewer failures than sample slots: one success is unavoidable.
        return 1.0;
    }

    let mut ratio = 1.0f64;
    for i in 0..kk {
        ratio *= (n - c - i) as f64 / (n - i) as f64;
    }
    1.0 - ratio
}

/// Normalize the requested pass@k values against the configured round count:
/// de-duplicate, sort ascending, and drop values exceeding the rounds
/// actually run. An emptied set falls back to k=1.
#[must_use]
pub fn effective_ks(requested: &[usize], rounds: usize) -> Vec<usize> {
    let mut ks: Vec<usize> = requested.iter().copied().filter(|&k| k > 0).collect();
    ks.sort_unstable();
    ks.dedup();

    let (kept, dropped): (Vec<usize>, Vec<usize>) = ks.into_iter().partition(|&k| k <= rounds);
    if !dropped.is_empty() {
        tracing::warn!(?dropped, rounds, "dropping pass@k values exceeding round count");
    }
    if kept.is_empty() {
        tracing::warn!(rounds, "no usable pass@k values requested, assuming k=1");
        return vec![1];
    }
    kept
}

/// Raw per-(model, task) counters, monotonically accumulated during the fold
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawCounters {
    /// Attempts that passed validation
    pub success: u32,
    /// Total attempts recorded
    pub attempts: u32,
    /// Summed wall-clock duration across attempts
    pub total_ms: u64,
}

/// Statistics derived from the raw counters, never accumulated directly
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedStats {
    /// Success percentage, rounded to one decimal place
    pub percent: f64,
    /// Mean attempt duration in milliseconds, rounded
    pub avg_ms: u64,
    /// pass@k percentage per effective k, rounded to one decimal place
    pub pass_at: BTreeMap<usize, f64>,
}

/// Per-(model, task) statistic: counters plus their derived view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStats {
    /// Difficulty tier declared by the task id
    pub difficulty: Difficulty,
    /// Task family (id with the difficulty suffix stripped)
    pub family: String,
    #[serde(flatten)]
    pub raw: RawCounters,
    #[serde(flatten)]
    pub derived: DerivedStats,
}

/// Mean-of-means rollup over a group of tasks.
///
/// Each member task contributes its own derived percentages with equal
/// weight, regardless of attempt count. This weights tasks equally rather
/// than pooling counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RollupStats {
    /// Number of member tasks
    pub tasks: usize,
    /// Mean of the member tasks' success percentages
    pub percent: f64,
    /// Mean of the member tasks' pass@k percentages, per k
    pub pass_at: BTreeMap<usize, f64>,
}

/// All statistics for one model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelStats {
    /// Per-task statistics, keyed by task id
    pub tasks: BTreeMap<String, TaskStats>,
    /// Rollup by task family
    pub families: BTreeMap<String, RollupStats>,
    /// Rollup by difficulty tier
    pub difficulties: BTreeMap<Difficulty, RollupStats>,
}

/// Batch aggregator: a pure fold over the completed trial record list
#[derive(Debug, Clone)]
pub struct Aggregator {
    ks: Vec<usize>,
}

impl Aggregator {
    /// Create an aggregator for an already-normalized set of k values
    #[must_use]
    pub fn new(ks: Vec<usize>) -> Self {
        Self { ks }
    }

    /// The k values this aggregator derives pass@k for
    #[must_use]
    pub fn ks(&self) -> &[usize] {
        &self.ks
    }

    /// Fold the record stream into per-model statistics.
    ///
    /// Single pass for the counters, then derivation and rollups recomputed
    /// from them. Records are grouped by (model, task id).
    #[must_use]
    pub fn aggregate(&self, records: &[TrialRecord]) -> BTreeMap<String, ModelStats> {
        let mut counters: BTreeMap<String, BTreeMap<String, (RawCounters, Difficulty)>> =
            BTreeMap::new();

        for record in records {
            let (raw, _) = counters
                .entry(record.model.clone())
                .or_default()
                .entry(record.task_id.clone())
                .or_insert((RawCounters::default(), record.difficulty));
            raw.attempts += 1;
            if record.passed {
                raw.success += 1;
            }
            raw.total_ms += record.duration_ms;
        }

        counters
            .into_iter()
            .map(|(model, tasks)| {
                let task_stats: BTreeMap<String, TaskStats> = tasks
                    .into_iter()
                    .map(|(task_id, (raw, difficulty))| {
                        let stats = TaskStats {
                            difficulty,
                            family: Difficulty::family_of(&task_id).to_string(),
                            raw,
                            derived: self.derive(raw),
                        };
                        (task_id, stats)
                    })
                    .collect();

                let families = Self::rollup(&task_stats, |s| s.family.clone());
                let difficulties = Self::rollup(&task_stats, |s| s.difficulty);

                (
                    model,
                    ModelStats {
                        tasks: task_stats,
                        families,
                        difficulties,
                    },
                )
            })
            .collect()
    }

    /// Recompute the derived view from raw counters.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn derive(&self, raw: RawCounters) -> DerivedStats {
        if raw.attempts == 0 {
            return DerivedStats::default();
        }
        let n = raw.attempts as usize;
        let c = raw.success as usize;

        let pass_at = self
            .ks
            .iter()
            .map(|&k| (k, round1(pass_at_k(n, c, k) * 100.0)))
            .collect();

        DerivedStats {
            percent: round1(f64::from(raw.success) / f64::from(raw.attempts) * 100.0),
            avg_ms: (raw.total_ms as f64 / f64::from(raw.attempts)).round() as u64,
            pass_at,
        }
    }

    /// Mean-of-means rollup keyed by an arbitrary grouping of task stats.
    fn rollup<K: Ord>(
        task_stats: &BTreeMap<String, TaskStats>,
        key: impl Fn(&TaskStats) -> K,
    ) -> BTreeMap<K, RollupStats> {
        let mut groups: BTreeMap<K, Vec<&TaskStats>> = BTreeMap::new();
        for stats in task_stats.values() {
            groups.entry(key(stats)).or_default().push(stats);
        }

        groups
            .into_iter()
            .map(|(group, members)| {
                let count = members.len();
                let percent =
                    round1(members.iter().map(|s| s.derived.percent).sum::<f64>() / count as f64);

                let mut pass_at: BTreeMap<usize, f64> = BTreeMap::new();
                for member in &members {
                    for (&k, &value) in &member.derived.pass_at {
                        *pass_at.entry(k).or_default() += value;
                    }
                }
                for value in pass_at.values_mut() {
                    *value = round1(*value / count as f64);
                }

                (
                    group,
                    RollupStats {
                        tasks: count,
                        percent,
                        pass_at,
                    },
                )
            })
            .collect()
    }
}

/// Round to one decimal place
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
