//! Single-worker control loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use aem_model::ReconcileKey;

use crate::collab::{DeploymentCache, InstanceConfigClient, ResourceStore, SecretStore};
use crate::config::ControllerConfig;
use crate::dispatch::EventDispatch;
use crate::metrics::{NoopMetrics, ReconcileMetrics, SyncOutcome};
use crate::queue::{ItemBackoff, WorkQueue};
use crate::reconciler::Reconciler;
use crate::secrets::{PasswordGenerator, RandomPasswordGenerator};

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn DeploymentCache>,
    pub store: Arc<dyn ResourceStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub config: Arc<dyn InstanceConfigClient>,
    pub passwords: Arc<dyn PasswordGenerator>,
    pub metrics: Arc<dyn ReconcileMetrics>,
}

impl Collaborators {
    pub fn new(
        cache: Arc<dyn DeploymentCache>,
        store: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretStore>,
        config: Arc<dyn InstanceConfigClient>,
    ) -> Self {
        Self {
            cache,
            store,
            secrets,
            config,
            passwords: Arc::new(RandomPasswordGenerator),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_passwords(mut self, passwords: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ReconcileMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Pulls keys off the [`WorkQueue`] and reconciles them one at a time.
pub struct Controller {
    config: ControllerConfig,
    queue: WorkQueue,
    dispatch: EventDispatch,
    reconciler: Reconciler,
    metrics: Arc<dyn ReconcileMetrics>,
}

impl Controller {
    pub fn new(config: ControllerConfig, collab: Collaborators) -> Self {
        let queue = WorkQueue::new(ItemBackoff::new(config.backoff_base, config.backoff_max));
        let dispatch = EventDispatch::new(queue.clone(), collab.secrets.clone());
        let reconciler = Reconciler::new(&collab, &config);
        Self {
            config,
            queue,
            dispatch,
            reconciler,
            metrics: collab.metrics,
        }
    }

    /// Handle for feeding notifications into the queue.
    pub fn dispatcher(&self) -> EventDispatch {
        self.dispatch.clone()
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Runs the worker until `stop` fires or the queue is shut down.
    ///
    /// Cancellation is observed between keys only; a sync in progress runs
    /// to completion. The queue is shut down on exit.
    pub async fn run(&self, stop: CancellationToken) {
        info!("controller started");
        let mut failures: HashMap<ReconcileKey, u32> = HashMap::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                key = self.queue.get() => key,
            };
            let Some(key) = next else { break };
            self.process(&key, &mut failures).await;
            self.queue.done(&key);
            self.metrics.set_queue_depth(self.queue.len());
        }
        self.queue.shut_down();
        info!("controller stopped");
    }

    async fn process(&self, key: &ReconcileKey, failures: &mut HashMap<ReconcileKey, u32>) {
        let started = Instant::now();
        let res = self.reconciler.sync(key).await;
        let elapsed = started.elapsed();

        let err = match res {
            Ok(()) => {
                self.metrics.record_sync(SyncOutcome::Success, elapsed);
                failures.remove(key);
                self.queue.forget(key);
                return;
            }
            Err(e) => e,
        };

        if err.is_not_ready() {
            self.metrics.record_sync(SyncOutcome::NotReady, elapsed);
            debug!(key = %key, "not ready, requeue");
            self.queue.add_rate_limited(key.clone());
            return;
        }

        self.metrics.record_sync(SyncOutcome::Error, elapsed);
        let count = failures.entry(key.clone()).or_insert(0);
        *count += 1;
        error!(key = %key, failures = *count, error = %err, "sync failed");

        if self.config.failure_threshold > 0 && *count >= self.config.failure_threshold {
            if let Err(e) = self.reconciler.record_failure(key, &err).await {
                warn!(key = %key, error = %e, "could not record failure");
            }
        }
        self.queue.add_rate_limited(key.clone());
    }
}
