//! Run configuration.
//!
//! The configuration surface is deliberately small: how many attempt rounds
//! per (model, task) pair, which pass@k values to derive, where artifacts
//! and the summary land, and how the artifact host finds its runtime.

use crate::stats::effective_ks;
use std::path::PathBuf;

/// Default attempt rounds per (model, task) pair
pub const DEFAULT_ROUNDS: usize = 10;

/// Default requested pass@k values
pub const DEFAULT_KS: [usize; 3] = [1, 5, 10];

/// Configuration for one benchmark run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Attempt rounds per (model, task) pair
    pub rounds: usize,
    /// Requested pass@k values, as given (normalized separately)
    pub requested_ks: Vec<usize>,
    /// Output directory for generated artifacts and the summary
    pub out_dir: PathBuf,
    /// Command for the artifact host runtime
    pub node_command: String,
    /// Directory whose `node_modules` supplies framework deps to artifacts
    pub module_root: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            requested_ks: DEFAULT_KS.to_vec(),
            out_dir: PathBuf::from("generated"),
            node_command: "node".to_string(),
            module_root: None,
        }
    }
}

impl RunConfig {
    /// The k values actually derivable for this round count: de-duplicated,
    /// sorted, filtered to `<= rounds`, with k=1 assumed when emptied.
    #[must_use]
    pub fn effective_ks(&self) -> Vec<usize> {
        effective_ks(&self.requested_ks, self.rounds)
    }
}
