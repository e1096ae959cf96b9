use std::collections::HashMap;
use std::time::Duration;

use aem_model::ReconcileKey;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
    failures: HashMap<ReconcileKey, u32>,
}

impl ItemBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Delay before the next retry of `key`; counts one more failure.
    pub fn when(&mut self, key: &ReconcileKey) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn forget(&mut self, key: &ReconcileKey) {
        self.failures.remove(key);
    }

    pub fn num_requeues(&self, key: &ReconcileKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_failure() {
        let key = ReconcileKey::new("ns", "a");
        let mut b = ItemBackoff::default();
        assert_eq!(b.when(&key), Duration::from_millis(5));
        assert_eq!(b.when(&key), Duration::from_millis(10));
        assert_eq!(b.when(&key), Duration::from_millis(20));
        assert_eq!(b.num_requeues(&key), 3);
    }

    #[test]
    fn caps_at_max() {
        let key = ReconcileKey::new("ns", "a");
        let mut b = ItemBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
        let delays: Vec<_> = (0..40).map(|_| b.when(&key)).collect();
        assert_eq!(delays[3], Duration::from_secs(8));
        assert_eq!(delays[39], Duration::from_secs(8));
    }

    #[test]
    fn forget_resets_and_keys_are_independent() {
        let a = ReconcileKey::new("ns", "a");
        let other = ReconcileKey::new("ns", "b");
        let mut b = ItemBackoff::default();
        b.when(&a);
        b.when(&a);
        assert_eq!(b.when(&other), Duration::from_millis(5));

        b.forget(&a);
        assert_eq!(b.num_requeues(&a), 0);
        assert_eq!(b.when(&a), Duration::from_millis(5));
    }
}
