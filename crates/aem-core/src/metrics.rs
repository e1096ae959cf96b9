use std::time::Duration;

use aem_model::Runmode;

/// Result of one reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    /// Instances still coming up.
    NotReady,
    Error,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::NotReady => "not_ready",
            SyncOutcome::Error => "error",
        }
    }
}

/// Hook for exporting controller metrics.
pub trait ReconcileMetrics: Send + Sync {
    fn record_sync(&self, outcome: SyncOutcome, elapsed: Duration);
    fn record_scaling(&self, runmode: Runmode, created: usize, removed: usize);
    fn set_queue_depth(&self, depth: usize);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl ReconcileMetrics for NoopMetrics {
    fn record_sync(&self, _: SyncOutcome, _: Duration) {}
    fn record_scaling(&self, _: Runmode, _: usize, _: usize) {}
    fn set_queue_depth(&self, _: usize) {}
}
