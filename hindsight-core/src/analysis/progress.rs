//! Progress reporting for analysis runs.
//!
//! Progress is counted in collaborator calls, one per batch.

use super::BatchStatus;

/// Receives run progress. All methods default to doing nothing.
pub trait ProgressReporter {
    /// Called once before the first batch.
    fn on_start(&mut self, _total_batches: usize) {}

    /// Called before the collaborator call for batch `index` (zero-based).
    fn on_batch_start(&mut self, _index: usize, _total_batches: usize, _estimated_tokens: usize) {}

    /// Called after batch `index` finished, successfully or not.
    fn on_batch_done(&mut self, _index: usize, _status: &BatchStatus) {}

    /// Called once after the last batch.
    fn on_finish(&mut self) {}
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}
