//! One reconciliation pass for one deployment key.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use aem_model::{
    ConditionType, Deployment, Instance, ReconcileKey, Runmode, labels_for_deployment,
};

use crate::agents::AgentConfigurator;
use crate::collab::{DeploymentCache, ResourceStore};
use crate::config::ControllerConfig;
use crate::controller::Collaborators;
use crate::phase::{Milestone, PhaseStateMachine};
use crate::scaling::ScalingPolicy;
use crate::secrets::SecretLifecycle;
use crate::{CoreError, now_rfc3339};

/// Drives one deployment toward its desired topology.
///
/// Every step is idempotent, so a pass aborted by an error is simply
/// repeated from the current state on the next attempt. Nothing already
/// persisted is rolled back.
#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<dyn DeploymentCache>,
    store: Arc<dyn ResourceStore>,
    secrets: SecretLifecycle,
    scaling: ScalingPolicy,
    agents: AgentConfigurator,
}

impl Reconciler {
    pub fn new(collab: &Collaborators, config: &ControllerConfig) -> Self {
        let secrets = SecretLifecycle::new(
            collab.secrets.clone(),
            collab.config.clone(),
            collab.passwords.clone(),
        );
        let scaling = ScalingPolicy::new(
            collab.store.clone(),
            secrets.clone(),
            collab.metrics.clone(),
            config.claim_wait,
        );
        let agents = AgentConfigurator::new(secrets.clone(), collab.config.clone());
        Self {
            cache: collab.cache.clone(),
            store: collab.store.clone(),
            secrets,
            scaling,
            agents,
        }
    }

    pub fn secrets(&self) -> &SecretLifecycle {
        &self.secrets
    }

    /// Converges the deployment behind `key`.
    ///
    /// Returns [`CoreError::NotReady`] while instances are still coming up.
    #[instrument(name = "sync", skip(self), fields(key = %key))]
    pub async fn sync(&self, key: &ReconcileKey) -> Result<(), CoreError> {
        let started = Instant::now();
        let res = self.sync_inner(key).await;
        debug!(elapsed = ?started.elapsed(), ok = res.is_ok(), "sync finished");
        res
    }

    async fn sync_inner(&self, key: &ReconcileKey) -> Result<(), CoreError> {
        let Some(mut deployment) = self.cache.get(key).await? else {
            debug!("deployment not found, already deleted");
            return Ok(());
        };

        if deployment.spec.paused {
            if !deployment.status.control_paused {
                deployment.status.control_paused = true;
                self.persist(&mut deployment).await?;
                info!("deployment paused");
            }
            return Ok(());
        }
        if deployment.status.control_paused {
            deployment.status.control_paused = false;
            self.persist(&mut deployment).await?;
            info!("deployment resumed");
        }
        if deployment.spec.authors.replicas > 1 {
            warn!(replicas = deployment.spec.authors.replicas, "more than one author requested");
        }

        if PhaseStateMachine::next(deployment.status.phase, Milestone::Provisioned).is_some() {
            self.store.ensure_discovery_service(&deployment).await?;
            self.store.ensure_base_config(&deployment).await?;
            PhaseStateMachine::advance(&mut deployment.status, Milestone::Provisioned);
            self.persist(&mut deployment).await?;
            info!(phase = %deployment.status.phase, "base resources ensured");
        }

        let instances = self.list(&deployment).await?;
        let mut resized = false;
        let mut failed = None;
        for runmode in Runmode::ALL {
            let actual = by_runmode(&instances, runmode);
            let desired = deployment.spec.replicas(runmode) as usize;
            if actual.len() == desired {
                continue;
            }
            // The very first instance of a kind does not count as a resize.
            if !actual.is_empty() {
                resized = true;
                let (kind, other) = if actual.len() < desired {
                    (ConditionType::ScalingUp, ConditionType::ScalingDown)
                } else {
                    (ConditionType::ScalingDown, ConditionType::ScalingUp)
                };
                let reason = format!("{runmode} {} -> {desired}", actual.len());
                deployment.status.set_condition(kind, &reason, &now_rfc3339());
                deployment.status.clear_condition(other);
            }
            if let Err(e) = self.scaling.converge(&deployment, runmode, &actual).await {
                failed = Some(e);
                break;
            }
        }
        // Owed even when a later group failed.
        if resized {
            PhaseStateMachine::advance(&mut deployment.status, Milestone::Resized);
            self.persist(&mut deployment).await?;
        }
        if let Some(e) = failed {
            return Err(e);
        }

        let instances = self.list(&deployment).await?;
        if let Some(reason) = not_ready_reason(&deployment, &instances) {
            debug!(%reason, "waiting for instances");
            return Err(CoreError::NotReady(key.to_string()));
        }

        let mut changed = PhaseStateMachine::advance(&mut deployment.status, Milestone::Healthy);
        let status = &mut deployment.status;
        for kind in [
            ConditionType::ScalingUp,
            ConditionType::ScalingDown,
            ConditionType::ReconcileFailed,
        ] {
            changed |= status.clear_condition(kind);
        }
        changed |= status.set_condition(ConditionType::Ready, "all instances ready", &now_rfc3339());
        if status.version != deployment.spec.version {
            status.version = deployment.spec.version.clone();
            changed = true;
        }
        if status.dispatcher_version != deployment.spec.dispatcher_version {
            status.dispatcher_version = deployment.spec.dispatcher_version.clone();
            changed = true;
        }
        if changed {
            self.persist(&mut deployment).await?;
            info!(phase = %deployment.status.phase, "deployment running");
        }

        for instance in instances
            .iter()
            .filter(|i| i.runmode().is_some_and(|r| r.profile().has_credentials))
        {
            self.secrets
                .bootstrap(&deployment, instance, self.store.as_ref())
                .await?;
        }

        let publishers = by_runmode(&instances, Runmode::Publish);
        for author in by_runmode(&instances, Runmode::Author) {
            self.agents
                .converge_author(&deployment, &author, &publishers)
                .await?;
        }
        for publish in &publishers {
            self.agents.converge_publish(&deployment, publish).await?;
        }
        Ok(())
    }

    /// Marks the deployment `Failed` after repeated unrecoverable errors.
    ///
    /// The key keeps being retried; a later successful pass moves the
    /// deployment back to `Running`.
    pub async fn record_failure(&self, key: &ReconcileKey, err: &CoreError) -> Result<(), CoreError> {
        let Some(mut deployment) = self.cache.get(key).await? else {
            return Ok(());
        };
        let mut changed = PhaseStateMachine::advance(&mut deployment.status, Milestone::Unrecoverable);
        changed |= deployment.status.set_condition(
            ConditionType::ReconcileFailed,
            &err.to_string(),
            &now_rfc3339(),
        );
        if changed {
            self.persist(&mut deployment).await?;
            warn!(key = %key, error = %err, "deployment marked failed");
        }
        Ok(())
    }

    async fn list(&self, deployment: &Deployment) -> Result<Vec<Instance>, CoreError> {
        let selector = labels_for_deployment(deployment.name());
        Ok(self
            .store
            .list_instances(deployment.namespace(), &selector)
            .await?)
    }

    async fn persist(&self, deployment: &mut Deployment) -> Result<(), CoreError> {
        let updated = self.store.update_status(deployment).await?;
        deployment.metadata.resource_version = updated.metadata.resource_version;
        Ok(())
    }
}

fn by_runmode(instances: &[Instance], runmode: Runmode) -> Vec<Instance> {
    instances
        .iter()
        .filter(|i| i.is_runmode(runmode))
        .cloned()
        .collect()
}

fn not_ready_reason(deployment: &Deployment, instances: &[Instance]) -> Option<String> {
    if let Some(inst) = instances
        .iter()
        .find(|i| i.runmode().is_some() && !i.is_healthy())
    {
        return Some(format!("instance {} not healthy", inst.name()));
    }
    for runmode in Runmode::ALL {
        let actual = instances.iter().filter(|i| i.is_runmode(runmode)).count();
        let desired = deployment.spec.replicas(runmode) as usize;
        if actual != desired {
            return Some(format!("{runmode}: {actual} of {desired} instances"));
        }
    }
    None
}
