use std::time::Duration;

use crate::scaling::ClaimWait;

/// Tunables of the controller loop.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// First requeue delay of a failing key.
    pub backoff_base: Duration,
    /// Upper bound of the requeue delay.
    pub backoff_max: Duration,
    pub claim_wait: ClaimWait,
    /// Consecutive failures (not counting "not ready") before the
    /// deployment is marked `Failed`. `0` disables marking.
    pub failure_threshold: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_secs(1000),
            claim_wait: ClaimWait::default(),
            failure_threshold: 15,
        }
    }
}
