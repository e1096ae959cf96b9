use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use aem_core::{ReconcileMetrics, SyncOutcome};
use aem_model::Runmode;

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    syncs: IntCounterVec,
    sync_duration: HistogramVec,
    created: IntCounterVec,
    removed: IntCounterVec,
    queue_depth: IntGauge,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Registers every collector on `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let syncs = IntCounterVec::new(
            Opts::new("aem_reconcile_total", "Reconciliations by outcome"),
            &["outcome"],
        )?;
        let sync_duration = HistogramVec::new(
            HistogramOpts::new("aem_reconcile_duration_seconds", "Reconciliation latency")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["outcome"],
        )?;
        let created = IntCounterVec::new(
            Opts::new("aem_instances_created_total", "Instances created by runmode"),
            &["runmode"],
        )?;
        let removed = IntCounterVec::new(
            Opts::new("aem_instances_removed_total", "Instances removed by runmode"),
            &["runmode"],
        )?;
        let queue_depth = IntGauge::new("aem_queue_depth", "Keys waiting in the work queue")?;

        registry.register(Box::new(syncs.clone()))?;
        registry.register(Box::new(sync_duration.clone()))?;
        registry.register(Box::new(created.clone()))?;
        registry.register(Box::new(removed.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            syncs,
            sync_duration,
            created,
            removed,
            queue_depth,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl ReconcileMetrics for PrometheusMetrics {
    fn record_sync(&self, outcome: SyncOutcome, elapsed: Duration) {
        let label = [outcome.as_str()];
        self.syncs.with_label_values(&label).inc();
        self.sync_duration
            .with_label_values(&label)
            .observe(elapsed.as_secs_f64());
    }

    fn record_scaling(&self, runmode: Runmode, created: usize, removed: usize) {
        let label = [runmode.as_str()];
        if created > 0 {
            self.created.with_label_values(&label).inc_by(created as u64);
        }
        if removed > 0 {
            self.removed.with_label_values(&label).inc_by(removed as u64);
        }
    }

    fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_syncs_by_outcome() {
        let m = PrometheusMetrics::new().unwrap();
        m.record_sync(SyncOutcome::Success, Duration::from_millis(20));
        m.record_sync(SyncOutcome::Success, Duration::from_millis(30));
        m.record_sync(SyncOutcome::NotReady, Duration::from_millis(5));

        assert_eq!(m.syncs.with_label_values(&["success"]).get(), 2);
        assert_eq!(m.syncs.with_label_values(&["not_ready"]).get(), 1);
        assert_eq!(m.sync_duration.with_label_values(&["success"]).get_sample_count(), 2);
    }

    #[test]
    fn scaling_counters_skip_zero() {
        let m = PrometheusMetrics::new().unwrap();
        m.record_scaling(Runmode::Publish, 2, 0);
        m.record_scaling(Runmode::Publish, 0, 1);

        assert_eq!(m.created.with_label_values(&["publish"]).get(), 2);
        assert_eq!(m.removed.with_label_values(&["publish"]).get(), 1);
        let text = m.encode_text().unwrap();
        assert!(!text.contains("runmode=\"author\""));
    }

    #[test]
    fn registries_are_independent() {
        let a = PrometheusMetrics::new().unwrap();
        let b = PrometheusMetrics::new().unwrap();
        a.set_queue_depth(4);
        assert_eq!(a.queue_depth.get(), 4);
        assert_eq!(b.queue_depth.get(), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
