use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use aem_model::{
    Deployment, Instance, InstancePhase, Labels, ObjectMeta, ReconcileKey, Runmode, claim_name,
    ingress_host, instance_host, instance_labels, selector_matches,
};

use super::{Injected, lock};
use crate::collab::{ClaimPhase, DeploymentCache, ResourceStore, StoreError};
use crate::dispatch::{WatchEvent, WatchObject};

/// A mutating call received by [`MemoryCluster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterOp {
    EnsureDiscoveryService(String),
    EnsureBaseConfig(String),
    CreateClaim(String),
    CreateInstance(String),
    CreateEndpoint(String),
    DeleteEndpoint(String),
    DeleteClaim(String),
    DeleteInstance(String),
    UpdateStatus(String),
    UpdateInstance(String),
}

type Id = (String, String);

fn id(namespace: &str, name: &str) -> Id {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug)]
struct State {
    deployments: BTreeMap<ReconcileKey, Deployment>,
    instances: BTreeMap<Id, Instance>,
    claims: BTreeMap<Id, ClaimPhase>,
    /// Instance endpoints and their ingress host.
    endpoints: BTreeMap<Id, String>,
    discovery: BTreeSet<Id>,
    base_config: BTreeSet<Id>,
    ops: Vec<ClusterOp>,
    failing: HashSet<&'static str>,
    auto_bind: bool,
    auto_ready: bool,
    revision: u64,
    external_domain: String,
    events: Option<mpsc::UnboundedSender<WatchEvent>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            deployments: BTreeMap::new(),
            instances: BTreeMap::new(),
            claims: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            discovery: BTreeSet::new(),
            base_config: BTreeSet::new(),
            ops: Vec::new(),
            failing: HashSet::new(),
            auto_bind: true,
            auto_ready: true,
            revision: 0,
            external_domain: "local".to_string(),
            events: None,
        }
    }
}

impl State {
    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(op) {
            return Err(StoreError::api(Injected(op.to_string())));
        }
        Ok(())
    }

    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn emit(&self, event: WatchEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody listens anymore.
            let _ = tx.send(event);
        }
    }

    fn require_deployment(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        if self.deployments.contains_key(&ReconcileKey::new(namespace, name)) {
            return Ok(());
        }
        Err(StoreError::not_found("deployment", ReconcileKey::new(namespace, name).to_string()))
    }
}

/// Cluster state held in memory: deployments, instances and their resources.
///
/// By default claims bind as soon as they are created and instances start
/// running and ready with an address. Both can be switched off to let a
/// test or a simulated kubelet drive those transitions.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every change as a [`WatchEvent`] on `tx`.
    pub fn with_events(self, tx: mpsc::UnboundedSender<WatchEvent>) -> Self {
        lock(&self.state).events = Some(tx);
        self
    }

    /// DNS suffix of ingress hosts, `local` by default.
    pub fn with_external_domain(self, domain: &str) -> Self {
        lock(&self.state).external_domain = domain.to_string();
        self
    }

    pub fn set_auto_bind(&self, on: bool) {
        lock(&self.state).auto_bind = on;
    }

    pub fn set_auto_ready(&self, on: bool) {
        lock(&self.state).auto_ready = on;
    }

    /// Makes every call of the named [`ResourceStore`] method fail, e.g. `"create_instance"`.
    pub fn fail(&self, op: &'static str) {
        lock(&self.state).failing.insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        lock(&self.state).failing.remove(op);
    }

    /// Creates or replaces a deployment's desired state, keeping its status.
    pub fn upsert_deployment(&self, mut deployment: Deployment) {
        let mut st = lock(&self.state);
        let key = deployment.key();
        let old = st.deployments.get(&key).cloned();
        if let Some(old) = &old {
            deployment.status = old.status.clone();
            deployment.metadata.uid = old.metadata.uid.clone();
        } else if deployment.metadata.uid.is_empty() {
            deployment.metadata.uid = format!("uid-{}", key.as_str().replace('/', "-"));
        }
        deployment.metadata.resource_version = st.next_revision();
        st.deployments.insert(key, deployment.clone());
        let new = WatchObject::Deployment(deployment);
        match old {
            Some(old) => st.emit(WatchEvent::Updated(WatchObject::Deployment(old), new)),
            None => st.emit(WatchEvent::Added(new)),
        }
    }

    /// Deletes a deployment and cascades to everything it owns.
    pub fn remove_deployment(&self, key: &ReconcileKey) -> Option<Deployment> {
        let mut st = lock(&self.state);
        let deployment = st.deployments.remove(key)?;
        let ns = deployment.namespace().to_string();
        let owned: Vec<Id> = st
            .instances
            .iter()
            .filter(|(_, i)| i.namespace() == ns && i.deployment() == Some(deployment.name()))
            .map(|(id, _)| id.clone())
            .collect();
        for iid in owned {
            st.claims.remove(&id(&ns, &claim_name(&iid.1)));
            st.endpoints.remove(&iid);
            if let Some(inst) = st.instances.remove(&iid) {
                st.emit(WatchEvent::Deleted(WatchObject::Instance(inst)));
            }
        }
        let did = id(&ns, deployment.name());
        st.discovery.remove(&did);
        st.base_config.remove(&did);
        st.emit(WatchEvent::Deleted(WatchObject::Deployment(deployment.clone())));
        Some(deployment)
    }

    pub fn deployment(&self, key: &ReconcileKey) -> Option<Deployment> {
        lock(&self.state).deployments.get(key).cloned()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        lock(&self.state).deployments.values().cloned().collect()
    }

    pub fn instance(&self, namespace: &str, name: &str) -> Option<Instance> {
        lock(&self.state).instances.get(&id(namespace, name)).cloned()
    }

    /// Every instance in `namespace`, ordered by name.
    pub fn instances(&self, namespace: &str) -> Vec<Instance> {
        lock(&self.state)
            .instances
            .values()
            .filter(|i| i.namespace() == namespace)
            .cloned()
            .collect()
    }

    /// Stores `instance` as-is, outside the scaling flow.
    pub fn insert_instance(&self, instance: Instance) {
        let mut st = lock(&self.state);
        let iid = id(instance.namespace(), instance.name());
        st.instances.insert(iid, instance.clone());
        st.emit(WatchEvent::Added(WatchObject::Instance(instance)));
    }

    pub fn claim(&self, namespace: &str, name: &str) -> Option<ClaimPhase> {
        lock(&self.state).claims.get(&id(namespace, name)).copied()
    }

    pub fn has_endpoint(&self, namespace: &str, instance: &str) -> bool {
        lock(&self.state).endpoints.contains_key(&id(namespace, instance))
    }

    /// Ingress host routed to `instance`.
    pub fn endpoint_host(&self, namespace: &str, instance: &str) -> Option<String> {
        lock(&self.state).endpoints.get(&id(namespace, instance)).cloned()
    }

    /// Binds every pending claim; returns how many changed.
    pub fn bind_claims(&self) -> usize {
        let mut st = lock(&self.state);
        let mut bound = 0;
        for phase in st.claims.values_mut() {
            if *phase == ClaimPhase::Pending {
                *phase = ClaimPhase::Bound;
                bound += 1;
            }
        }
        bound
    }

    /// Sets the health of one instance, assigning an address when it becomes ready.
    pub fn set_instance_health(&self, namespace: &str, name: &str, healthy: bool) -> bool {
        let mut st = lock(&self.state);
        let Some(inst) = st.instances.get_mut(&id(namespace, name)) else {
            return false;
        };
        let old = inst.clone();
        apply_health(inst, healthy);
        let new = inst.clone();
        if old == new {
            return false;
        }
        st.emit(WatchEvent::Updated(WatchObject::Instance(old), WatchObject::Instance(new)));
        true
    }

    /// Marks every instance running and ready; returns how many changed.
    pub fn mark_all_healthy(&self) -> usize {
        let ids: Vec<Id> = lock(&self.state).instances.keys().cloned().collect();
        let mut changed = 0;
        for (ns, name) in &ids {
            if self.set_instance_health(ns, name, true) {
                changed += 1;
            }
        }
        changed
    }

    /// Mutating calls received so far, in order.
    pub fn ops(&self) -> Vec<ClusterOp> {
        lock(&self.state).ops.clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.state).ops.clear();
    }

    pub fn status_updates(&self) -> usize {
        lock(&self.state)
            .ops
            .iter()
            .filter(|op| matches!(op, ClusterOp::UpdateStatus(_)))
            .count()
    }
}

fn apply_health(inst: &mut Instance, healthy: bool) {
    if healthy {
        inst.phase = InstancePhase::Running;
        inst.ready = true;
        if inst.address.is_none() {
            inst.address = Some(instance_host(&inst.hostname, &inst.subdomain, inst.namespace()));
        }
    } else {
        inst.ready = false;
    }
}

#[async_trait]
impl DeploymentCache for MemoryCluster {
    async fn get(&self, key: &ReconcileKey) -> Result<Option<Deployment>, StoreError> {
        Ok(self.deployment(key))
    }
}

#[async_trait]
impl ResourceStore for MemoryCluster {
    async fn ensure_discovery_service(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("ensure_discovery_service")?;
        st.ops.push(ClusterOp::EnsureDiscoveryService(deployment.name().to_string()));
        st.discovery.insert(id(deployment.namespace(), deployment.name()));
        Ok(())
    }

    async fn ensure_base_config(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("ensure_base_config")?;
        st.ops.push(ClusterOp::EnsureBaseConfig(deployment.name().to_string()));
        st.base_config.insert(id(deployment.namespace(), deployment.name()));
        Ok(())
    }

    async fn create_claim(&self, claim: &str, deployment: &Deployment) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("create_claim")?;
        st.ops.push(ClusterOp::CreateClaim(claim.to_string()));
        let cid = id(deployment.namespace(), claim);
        if st.claims.contains_key(&cid) {
            return Err(StoreError::AlreadyExists {
                kind: "claim",
                name: claim.to_string(),
            });
        }
        let phase = if st.auto_bind {
            ClaimPhase::Bound
        } else {
            ClaimPhase::Pending
        };
        st.claims.insert(cid, phase);
        Ok(())
    }

    async fn claim_phase(&self, claim: &str, namespace: &str) -> Result<ClaimPhase, StoreError> {
        let st = lock(&self.state);
        st.check("claim_phase")?;
        st.claims
            .get(&id(namespace, claim))
            .copied()
            .ok_or_else(|| StoreError::not_found("claim", claim))
    }

    async fn create_instance(
        &self,
        name: &str,
        runmode: Runmode,
        deployment: &Deployment,
    ) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("create_instance")?;
        st.ops.push(ClusterOp::CreateInstance(name.to_string()));
        st.require_deployment(deployment.namespace(), deployment.name())?;
        let iid = id(deployment.namespace(), name);
        if st.instances.contains_key(&iid) {
            return Err(StoreError::AlreadyExists {
                kind: "instance",
                name: name.to_string(),
            });
        }

        let mut inst = Instance {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: deployment.namespace().to_string(),
                uid: format!("uid-{name}"),
                resource_version: st.next_revision(),
            },
            labels: instance_labels(name, runmode, deployment.name()),
            annotations: Labels::new(),
            owner: Some(deployment.as_owner_ref()),
            hostname: name.to_string(),
            subdomain: deployment.name().to_string(),
            ..Default::default()
        };
        if st.auto_ready {
            apply_health(&mut inst, true);
        }
        let profile = runmode.profile();
        trace!(
            instance = name,
            port = profile.port,
            probe = profile.probe_path,
            volume = ?profile.volume,
            "instance created"
        );
        st.instances.insert(iid, inst.clone());
        st.emit(WatchEvent::Added(WatchObject::Instance(inst)));
        Ok(())
    }

    async fn create_endpoint(
        &self,
        name: &str,
        _runmode: Runmode,
        deployment: &Deployment,
    ) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("create_endpoint")?;
        st.ops.push(ClusterOp::CreateEndpoint(name.to_string()));
        let eid = id(deployment.namespace(), name);
        if st.endpoints.contains_key(&eid) {
            return Err(StoreError::AlreadyExists {
                kind: "endpoint",
                name: name.to_string(),
            });
        }
        let host = ingress_host(name, deployment.namespace(), &st.external_domain);
        st.endpoints.insert(eid, host);
        Ok(())
    }

    async fn delete_endpoint(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("delete_endpoint")?;
        st.ops.push(ClusterOp::DeleteEndpoint(name.to_string()));
        if st.endpoints.remove(&id(namespace, name)).is_none() {
            return Err(StoreError::not_found("endpoint", name));
        }
        Ok(())
    }

    async fn delete_claim(&self, claim: &str, namespace: &str) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("delete_claim")?;
        st.ops.push(ClusterOp::DeleteClaim(claim.to_string()));
        st.claims
            .remove(&id(namespace, claim))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("claim", claim))
    }

    async fn delete_instance(&self, name: &str, namespace: &str) -> Result<(), StoreError> {
        let mut st = lock(&self.state);
        st.check("delete_instance")?;
        st.ops.push(ClusterOp::DeleteInstance(name.to_string()));
        let inst = st
            .instances
            .remove(&id(namespace, name))
            .ok_or_else(|| StoreError::not_found("instance", name))?;
        st.emit(WatchEvent::Deleted(WatchObject::Instance(inst)));
        Ok(())
    }

    async fn update_status(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let mut st = lock(&self.state);
        st.check("update_status")?;
        st.ops.push(ClusterOp::UpdateStatus(deployment.name().to_string()));
        let key = deployment.key();
        let revision = st.next_revision();
        let stored = st
            .deployments
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found("deployment", key.to_string()))?;
        let old = stored.clone();
        stored.status = deployment.status.clone();
        stored.metadata.resource_version = revision;
        let new = stored.clone();
        st.emit(WatchEvent::Updated(
            WatchObject::Deployment(old),
            WatchObject::Deployment(new.clone()),
        ));
        Ok(new)
    }

    async fn update_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let mut st = lock(&self.state);
        st.check("update_instance")?;
        st.ops.push(ClusterOp::UpdateInstance(instance.name().to_string()));
        let revision = st.next_revision();
        let stored = st
            .instances
            .get_mut(&id(instance.namespace(), instance.name()))
            .ok_or_else(|| StoreError::not_found("instance", instance.name()))?;
        let old = stored.clone();
        stored.annotations = instance.annotations.clone();
        stored.metadata.resource_version = revision;
        let new = stored.clone();
        st.emit(WatchEvent::Updated(
            WatchObject::Instance(old),
            WatchObject::Instance(new.clone()),
        ));
        Ok(new)
    }

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<Instance>, StoreError> {
        let st = lock(&self.state);
        st.check("list_instances")?;
        Ok(st
            .instances
            .values()
            .filter(|i| i.namespace() == namespace && selector_matches(selector, &i.labels))
            .cloned()
            .collect())
    }
}
