//! Ordinal-based grow/shrink of one runmode group.
//!
//! Creation walks canonical names in ascending ordinal order; removal starts
//! at the highest ordinal. Running the same plan twice yields no new
//! operations once the group has converged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use aem_model::{Deployment, Instance, Runmode, claim_name, instance_name};

use crate::collab::{ClaimPhase, ResourceStore, StoreError};
use crate::metrics::ReconcileMetrics;
use crate::retry::{RetryError, retry};
use crate::CoreError;
use crate::secrets::SecretLifecycle;

/// Operations converging one runmode group, computed before any side effect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalingPlan {
    /// Instance names to create, ascending ordinal.
    pub creates: Vec<String>,
    /// Instances to remove, highest ordinal first.
    pub removals: Vec<Instance>,
}

impl ScalingPlan {
    /// Diff between `actual` and `desired` for `runmode` of `deployment`.
    pub fn compute(deployment: &str, runmode: Runmode, actual: &[Instance], desired: u32) -> Self {
        let count = actual.len();
        let want = desired as usize;

        if count < want {
            let existing: HashSet<&str> = actual.iter().map(Instance::name).collect();
            let creates = (1..=desired)
                .map(|ordinal| instance_name(deployment, runmode, ordinal))
                .filter(|name| !existing.contains(name.as_str()))
                .collect();
            return Self {
                creates,
                removals: Vec::new(),
            };
        }

        if count > want {
            let mut sorted: Vec<Instance> = actual.to_vec();
            sorted.sort_by_key(Instance::ordinal);
            let removals = sorted.into_iter().rev().take(count - want).collect();
            return Self {
                creates: Vec::new(),
                removals,
            };
        }

        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.removals.is_empty()
    }
}

/// Budget for waiting on a claim to bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimWait {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for ClaimWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 10,
        }
    }
}

/// Executes [`ScalingPlan`]s against the resource store.
#[derive(Clone)]
pub struct ScalingPolicy {
    store: Arc<dyn ResourceStore>,
    secrets: SecretLifecycle,
    metrics: Arc<dyn ReconcileMetrics>,
    claim_wait: ClaimWait,
}

impl ScalingPolicy {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        secrets: SecretLifecycle,
        metrics: Arc<dyn ReconcileMetrics>,
        claim_wait: ClaimWait,
    ) -> Self {
        Self {
            store,
            secrets,
            metrics,
            claim_wait,
        }
    }

    /// Converges `runmode` of `deployment` from `actual` to its desired replicas.
    ///
    /// Stops at the first failed create or removal; the remaining work is
    /// picked up by the next reconciliation.
    #[instrument(level = "debug", skip_all, fields(deployment = deployment.name(), %runmode))]
    pub async fn converge(
        &self,
        deployment: &Deployment,
        runmode: Runmode,
        actual: &[Instance],
    ) -> Result<ScalingPlan, CoreError> {
        let desired = deployment.spec.replicas(runmode);
        let plan = ScalingPlan::compute(deployment.name(), runmode, actual, desired);
        if plan.is_empty() {
            return Ok(plan);
        }
        info!(
            actual = actual.len(),
            desired,
            creates = plan.creates.len(),
            removals = plan.removals.len(),
            "resizing"
        );

        let mut created = 0;
        let mut removed = 0;
        let result = async {
            for name in &plan.creates {
                self.create_instance(deployment, runmode, name).await?;
                created += 1;
            }
            for inst in &plan.removals {
                self.remove_instance(deployment, runmode, inst).await?;
                removed += 1;
            }
            Ok::<_, CoreError>(())
        }
        .await;

        self.metrics.record_scaling(runmode, created, removed);
        result.map(|()| plan)
    }

    /// Claim, wait for bind, unit, endpoint.
    ///
    /// The claim is kept when a later step fails; the unit is not.
    async fn create_instance(
        &self,
        deployment: &Deployment,
        runmode: Runmode,
        name: &str,
    ) -> Result<(), CoreError> {
        let claim = claim_name(name);
        tolerate_exists(self.store.create_claim(&claim, deployment).await)?;
        self.wait_bound(&claim, deployment.namespace()).await?;
        tolerate_exists(self.store.create_instance(name, runmode, deployment).await)?;
        if let Err(e) = tolerate_exists(self.store.create_endpoint(name, runmode, deployment).await) {
            // A unit without its endpoint would count as converged; drop it so
            // the next pass creates both again.
            match self.store.delete_instance(name, deployment.namespace()).await {
                Ok(()) => debug!(instance = name, "unit rolled back"),
                Err(rollback) if rollback.is_not_found() => {}
                Err(rollback) => {
                    warn!(instance = name, error = %rollback, "unit rollback failed")
                }
            }
            return Err(e.into());
        }
        debug!(instance = name, "instance created");
        Ok(())
    }

    async fn wait_bound(&self, claim: &str, namespace: &str) -> Result<(), CoreError> {
        let store = self.store.as_ref();
        let res = retry(self.claim_wait.interval, self.claim_wait.attempts, move || async move {
            match store.claim_phase(claim, namespace).await {
                Ok(phase) => Ok(phase == ClaimPhase::Bound),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await;

        match res {
            Ok(()) => Ok(()),
            Err(RetryError::Aborted(e)) => Err(CoreError::Store(e)),
            Err(RetryError::InvalidMaxRetries(n)) => {
                Err(CoreError::InvalidWait(format!("claim wait attempts must be > 0, got {n}")))
            }
            Err(source @ RetryError::Exhausted { .. }) => Err(CoreError::BindTimeout {
                claim: claim.to_string(),
                source,
            }),
        }
    }

    /// Secret first, then ingress/service, claim and unit.
    ///
    /// Every resource deletion is attempted; the first failure other than
    /// "not found" is returned afterwards.
    async fn remove_instance(
        &self,
        deployment: &Deployment,
        runmode: Runmode,
        instance: &Instance,
    ) -> Result<(), CoreError> {
        let name = instance.name();
        let ns = deployment.namespace();
        if runmode.profile().has_credentials {
            self.secrets.remove(deployment, name).await?;
        }

        let results = [
            self.store.delete_endpoint(name, ns).await,
            self.store.delete_claim(&claim_name(name), ns).await,
            self.store.delete_instance(name, ns).await,
        ];
        let mut first = None;
        for res in results {
            if let Err(e) = res {
                if e.is_not_found() {
                    continue;
                }
                warn!(instance = name, error = %e, "resource deletion failed");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e.into()),
            None => {
                debug!(instance = name, "instance removed");
                Ok(())
            }
        }
    }
}

fn tolerate_exists(res: Result<(), StoreError>) -> Result<(), StoreError> {
    match res {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}
