use std::sync::Arc;

use aem_core::memory::{ClusterOp, MemoryCluster, MemoryConfigClient, MemorySecretStore};
use aem_core::{Collaborators, ControllerConfig, CoreError, Reconciler};
use aem_model::{
    AgentKind, ConditionType, Deployment, DeploymentPhase, DeploymentSpec, InstanceSpec,
    ReconcileKey, Runmode,
};

struct Harness {
    cluster: Arc<MemoryCluster>,
    secrets: Arc<MemorySecretStore>,
    config: Arc<MemoryConfigClient>,
    reconciler: Reconciler,
}

fn harness() -> Harness {
    let cluster = Arc::new(MemoryCluster::new());
    let secrets = Arc::new(MemorySecretStore::new());
    let config = Arc::new(MemoryConfigClient::new());
    let collab = Collaborators::new(cluster.clone(), cluster.clone(), secrets.clone(), config.clone());
    let reconciler = Reconciler::new(&collab, &ControllerConfig::default());
    Harness {
        cluster,
        secrets,
        config,
        reconciler,
    }
}

fn spec(authors: u32, publishers: u32, dispatchers: u32) -> DeploymentSpec {
    DeploymentSpec {
        authors: InstanceSpec::new("small", authors),
        publishers: InstanceSpec::new("medium", publishers),
        dispatchers: InstanceSpec::new("small", dispatchers),
        version: "6.5.0".into(),
        dispatcher_version: "4.3.2".into(),
        paused: false,
    }
}

fn key() -> ReconcileKey {
    ReconcileKey::new("demo", "site")
}

impl Harness {
    fn apply(&self, spec: DeploymentSpec) {
        self.cluster.upsert_deployment(Deployment::new("demo", "site", spec));
    }

    fn current(&self) -> Deployment {
        self.cluster.deployment(&key()).unwrap()
    }

    fn names(&self, runmode: Runmode) -> Vec<String> {
        self.cluster
            .instances("demo")
            .into_iter()
            .filter(|i| i.is_runmode(runmode))
            .map(|i| i.name().to_string())
            .collect()
    }

    fn author_agents(&self) -> Vec<String> {
        let author = self.cluster.instance("demo", "site-author-001").unwrap();
        self.config
            .agents(author.address.as_deref().unwrap(), AgentKind::Author)
            .into_iter()
            .map(|a| a.name)
            .collect()
    }
}

#[tokio::test]
async fn missing_deployment_is_a_no_op() {
    let h = harness();
    h.reconciler.sync(&key()).await.unwrap();
    assert!(h.cluster.ops().is_empty());
}

#[tokio::test]
async fn fresh_deployment_converges_in_one_pass() {
    let h = harness();
    h.apply(spec(1, 2, 2));
    h.reconciler.sync(&key()).await.unwrap();

    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Running);
    assert_eq!(dep.status.version, "6.5.0");
    assert_eq!(dep.status.dispatcher_version, "4.3.2");
    assert!(dep.status.condition(ConditionType::Ready).is_some());

    assert_eq!(h.names(Runmode::Author), vec!["site-author-001"]);
    assert_eq!(h.names(Runmode::Publish), vec!["site-publish-001", "site-publish-002"]);
    assert_eq!(h.names(Runmode::Dispatcher), vec!["site-dispatcher-001", "site-dispatcher-002"]);
    for inst in h.cluster.instances("demo") {
        assert_eq!(inst.is_initialized(), inst.runmode() != Some(Runmode::Dispatcher));
    }

    assert_eq!(
        h.secrets.paths(),
        vec![
            "secret/demo/site/site-author-001",
            "secret/demo/site/site-publish-001",
            "secret/demo/site/site-publish-002",
        ]
    );
    let author = h.cluster.instance("demo", "site-author-001").unwrap();
    let stored = h.secrets.password("secret/demo/site/site-author-001").unwrap();
    assert_eq!(h.config.password(author.address.as_deref().unwrap()), stored);
    assert_eq!(h.author_agents(), vec!["site-publish-001", "site-publish-002"]);

    let ops = h.cluster.ops();
    assert_eq!(ops[0], ClusterOp::EnsureDiscoveryService("site".into()));
    assert_eq!(ops[1], ClusterOp::EnsureBaseConfig("site".into()));
}

#[tokio::test]
async fn converged_deployment_produces_no_operations() {
    let h = harness();
    h.apply(spec(1, 2, 1));
    h.reconciler.sync(&key()).await.unwrap();
    h.cluster.clear_ops();
    let applies = h.config.apply_count();

    h.reconciler.sync(&key()).await.unwrap();

    assert!(h.cluster.ops().is_empty(), "unexpected ops: {:?}", h.cluster.ops());
    assert_eq!(h.config.apply_count(), applies);
}

#[tokio::test]
async fn first_instances_do_not_count_as_resize() {
    let h = harness();
    h.cluster.set_auto_ready(false);
    h.apply(spec(1, 1, 1));

    let err = h.reconciler.sync(&key()).await.unwrap_err();
    assert!(err.is_not_ready());
    assert_eq!(h.current().status.phase, DeploymentPhase::Creating);
    assert_eq!(h.cluster.status_updates(), 1);

    h.cluster.mark_all_healthy();
    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn scale_up_passes_through_resizing() {
    let h = harness();
    h.apply(spec(1, 1, 1));
    h.reconciler.sync(&key()).await.unwrap();

    h.cluster.set_auto_ready(false);
    h.apply(spec(1, 3, 1));
    let err = h.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotReady(_)));

    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Resizing);
    let cond = dep.status.condition(ConditionType::ScalingUp).unwrap();
    assert_eq!(cond.reason, "publish 1 -> 3");

    h.cluster.mark_all_healthy();
    h.reconciler.sync(&key()).await.unwrap();
    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Running);
    assert!(dep.status.condition(ConditionType::ScalingUp).is_none());
    assert_eq!(
        h.author_agents(),
        vec!["site-publish-001", "site-publish-002", "site-publish-003"]
    );
}

#[tokio::test]
async fn scale_down_removes_highest_ordinal_and_its_traces() {
    let h = harness();
    h.apply(spec(1, 3, 3));
    h.reconciler.sync(&key()).await.unwrap();
    h.cluster.clear_ops();

    h.apply(spec(1, 1, 3));
    h.reconciler.sync(&key()).await.unwrap();

    assert_eq!(h.names(Runmode::Publish), vec!["site-publish-001"]);
    let deletes: Vec<ClusterOp> = h
        .cluster
        .ops()
        .into_iter()
        .filter(|op| matches!(op, ClusterOp::DeleteInstance(_)))
        .collect();
    assert_eq!(
        deletes,
        vec![
            ClusterOp::DeleteInstance("site-publish-003".into()),
            ClusterOp::DeleteInstance("site-publish-002".into()),
        ]
    );
    assert!(!h.secrets.paths().iter().any(|p| p.ends_with("site-publish-002")));
    assert!(!h.secrets.paths().iter().any(|p| p.ends_with("site-publish-003")));
    assert_eq!(h.author_agents(), vec!["site-publish-001"]);
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn paused_deployment_is_acknowledged_once() {
    let h = harness();
    let mut paused = spec(1, 1, 1);
    paused.paused = true;
    h.apply(paused);

    h.reconciler.sync(&key()).await.unwrap();
    h.reconciler.sync(&key()).await.unwrap();

    assert!(h.current().status.control_paused);
    assert_eq!(h.cluster.ops(), vec![ClusterOp::UpdateStatus("site".into())]);

    h.apply(spec(1, 1, 1));
    h.reconciler.sync(&key()).await.unwrap();
    let dep = h.current();
    assert!(!dep.status.control_paused);
    assert_eq!(dep.status.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn collaborator_error_aborts_the_pass() {
    let h = harness();
    h.cluster.fail("create_endpoint");
    h.apply(spec(0, 2, 0));

    let err = h.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    assert!(h.names(Runmode::Publish).is_empty());

    h.cluster.heal("create_endpoint");
    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.names(Runmode::Publish), vec!["site-publish-001", "site-publish-002"]);
    assert!(h.cluster.has_endpoint("demo", "site-publish-001"));
    assert!(h.cluster.has_endpoint("demo", "site-publish-002"));
}

#[tokio::test]
async fn half_created_dispatcher_is_repaired() {
    let h = harness();
    h.apply(spec(0, 0, 1));
    h.cluster.fail("create_endpoint");
    assert!(h.reconciler.sync(&key()).await.is_err());

    h.cluster.heal("create_endpoint");
    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);
    assert!(h.cluster.instance("demo", "site-dispatcher-001").is_some());
    assert!(h.cluster.has_endpoint("demo", "site-dispatcher-001"));
}

#[tokio::test]
async fn failure_marking_and_recovery() {
    let h = harness();
    h.apply(spec(0, 0, 1));
    h.reconciler.sync(&key()).await.unwrap();

    let err = CoreError::MissingAddress("site-dispatcher-001".into());
    h.reconciler.record_failure(&key(), &err).await.unwrap();
    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Failed);
    assert!(dep.status.condition(ConditionType::ReconcileFailed).is_some());

    h.reconciler.sync(&key()).await.unwrap();
    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Running);
    assert!(dep.status.condition(ConditionType::ReconcileFailed).is_none());
}

#[tokio::test]
async fn earlier_resize_is_recorded_when_a_later_group_fails() {
    let h = harness();
    h.apply(spec(1, 1, 2));
    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);

    h.cluster.fail("delete_endpoint");
    h.apply(spec(1, 2, 1));
    let err = h.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    assert_eq!(h.names(Runmode::Publish), vec!["site-publish-001", "site-publish-002"]);

    let dep = h.current();
    assert_eq!(dep.status.phase, DeploymentPhase::Resizing);
    let cond = dep.status.condition(ConditionType::ScalingDown).unwrap();
    assert_eq!(cond.reason, "dispatcher 2 -> 1");

    h.cluster.heal("delete_endpoint");
    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);
}

#[tokio::test]
async fn instance_without_runmode_does_not_block_readiness() {
    let h = harness();
    h.apply(spec(0, 0, 1));

    let mut stray = aem_model::Instance::default();
    stray.metadata.name = "site-sidecar".into();
    stray.metadata.namespace = "demo".into();
    stray.labels = aem_model::labels_for_deployment("site");
    assert!(!stray.is_healthy());
    h.cluster.insert_instance(stray);

    h.reconciler.sync(&key()).await.unwrap();
    assert_eq!(h.current().status.phase, DeploymentPhase::Running);
}
