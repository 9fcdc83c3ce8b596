//! Progress reporting hook.
//!
//! The driver calls the observer every `progress_interval` records. This is
//! observability only; the output of a run never depends on it.

use super::report::PipelineStats;
use log::info;

pub trait ProgressObserver {
    fn on_progress(&mut self, stats: &PipelineStats);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_progress(&mut self, _stats: &PipelineStats) {}
}

/// Logs updates at `info` level.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: &'static str,
}

impl LogProgress {
    pub fn new(label: &'static str) -> Self {
        LogProgress { label }
    }
}

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, stats: &PipelineStats) {
        info!(
            "{}: processed {} records ({} matched)",
            self.label, stats.total_records, stats.matched_records
        );
    }
}

