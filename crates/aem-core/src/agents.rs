//! Decides which replication agents should exist on each instance.
//!
//! Authors replicate to every publisher of the deployment; publishers
//! invalidate the dispatcher paired with them by ordinal. Only agents marked
//! as managed are ever removed.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use aem_model::{
    ADMIN_USER, AGENT_GRID_PROPERTY, Agent, AgentKind, Deployment, Instance, Runmode,
    dispatcher_for_publish,
};

use crate::CoreError;
use crate::collab::{Credentials, InstanceConfigClient, InstanceEndpoint};
use crate::secrets::SecretLifecycle;

#[derive(Clone)]
pub struct AgentConfigurator {
    secrets: SecretLifecycle,
    config: Arc<dyn InstanceConfigClient>,
}

impl AgentConfigurator {
    pub fn new(secrets: SecretLifecycle, config: Arc<dyn InstanceConfigClient>) -> Self {
        Self { secrets, config }
    }

    /// Registers missing publisher agents on `author` and drops managed
    /// agents whose publisher is gone.
    #[instrument(level = "debug", skip_all, fields(author = author.name()))]
    pub async fn converge_author(
        &self,
        deployment: &Deployment,
        author: &Instance,
        publishers: &[Instance],
    ) -> Result<(), CoreError> {
        let (endpoint, credentials) = self.access(deployment, author, Runmode::Author).await?;
        let existing = self
            .config
            .list_agents(&endpoint, &credentials, AgentKind::Author)
            .await?;
        let existing_names: HashSet<&str> = existing.iter().map(|a| a.name.as_str()).collect();
        let desired: HashSet<&str> = publishers.iter().map(Instance::name).collect();

        let mut changes = Vec::new();
        for publish in publishers {
            if existing_names.contains(publish.name()) {
                continue;
            }
            let password = self
                .secrets
                .password(deployment, publish.name())
                .await?
                .ok_or_else(|| CoreError::MissingCredentials(publish.name().to_string()))?;
            changes.push(Agent::create(
                AgentKind::Author,
                publish.name(),
                replication_properties(publish, &password),
            ));
        }
        for agent in existing.iter().filter(|a| a.is_managed()) {
            if !desired.contains(agent.name.as_str()) {
                changes.push(Agent::delete(AgentKind::Author, agent.name.as_str()));
            }
        }

        if changes.is_empty() {
            debug!("author agents up to date");
            return Ok(());
        }
        info!(changes = changes.len(), "updating author agents");
        self.config.apply_agents(&endpoint, &credentials, &changes).await?;
        Ok(())
    }

    /// Registers the dispatcher invalidation agent on `publish` if missing.
    #[instrument(level = "debug", skip_all, fields(publish = publish.name()))]
    pub async fn converge_publish(
        &self,
        deployment: &Deployment,
        publish: &Instance,
    ) -> Result<(), CoreError> {
        let (endpoint, credentials) = self.access(deployment, publish, Runmode::Publish).await?;
        let dispatcher = dispatcher_for_publish(publish.name());

        let existing = self
            .config
            .list_agents(&endpoint, &credentials, AgentKind::Publish)
            .await?;
        if existing.iter().any(|a| a.name == dispatcher) {
            return Ok(());
        }

        info!(%dispatcher, "registering invalidation agent");
        let agent = Agent::create(
            AgentKind::Publish,
            dispatcher.as_str(),
            invalidation_properties(publish, &dispatcher),
        );
        self.config.apply_agents(&endpoint, &credentials, &[agent]).await?;
        Ok(())
    }

    async fn access(
        &self,
        deployment: &Deployment,
        instance: &Instance,
        runmode: Runmode,
    ) -> Result<(InstanceEndpoint, Credentials), CoreError> {
        let address = instance
            .address
            .as_deref()
            .ok_or_else(|| CoreError::MissingAddress(instance.name().to_string()))?;
        let password = self
            .secrets
            .password(deployment, instance.name())
            .await?
            .ok_or_else(|| CoreError::MissingCredentials(instance.name().to_string()))?;
        Ok((
            InstanceEndpoint::new(address, runmode.profile().port),
            Credentials::new(ADMIN_USER, password),
        ))
    }
}

fn replication_properties(publish: &Instance, password: &str) -> Map<String, Value> {
    let port = Runmode::Publish.profile().port;
    props(json!({
        "jcr:title": publish.name(),
        AGENT_GRID_PROPERTY: true,
        "enabled": true,
        "transportUser": ADMIN_USER,
        "transportPassword": password,
        "port": port,
        "transportUri": format!(
            "http://{}.{}:{port}/bin/receive?sling:authRequestLogin=1",
            publish.hostname, publish.subdomain
        ),
    }))
}

fn invalidation_properties(publish: &Instance, dispatcher: &str) -> Map<String, Value> {
    let port = Runmode::Dispatcher.profile().port;
    props(json!({
        "jcr:title": dispatcher,
        AGENT_GRID_PROPERTY: true,
        "enabled": true,
        "protocolHTTPHeaders": ["CQ-Action:{action}", "CQ-Handle:{path}", "CQ-Path: {path}"],
        "protocolHTTPMethod": "GET",
        "retryDelay": "60000",
        "serializationType": "flush",
        "triggerReceive": "true",
        "triggerSpecific": "true",
        "noVersioning": "true",
        "logLevel": "error",
        "transportUri": format!(
            "http://{dispatcher}.{}.{}:{port}/dispatcher/invalidate.cache",
            publish.subdomain,
            publish.namespace()
        ),
    }))
}

fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::ResourceStore;
    use crate::memory::{MemoryCluster, MemoryConfigClient, MemorySecretStore};
    use crate::secrets::RandomPasswordGenerator;
    use aem_model::{AgentRecord, DeploymentSpec, InstanceSpec, instance_name};

    struct Fixture {
        cluster: Arc<MemoryCluster>,
        config: Arc<MemoryConfigClient>,
        secrets: SecretLifecycle,
        agents: AgentConfigurator,
        deployment: Deployment,
    }

    async fn fixture(publishers: u32) -> Fixture {
        let cluster = Arc::new(MemoryCluster::new());
        let config = Arc::new(MemoryConfigClient::new());
        let secrets = SecretLifecycle::new(
            Arc::new(MemorySecretStore::new()),
            config.clone(),
            Arc::new(RandomPasswordGenerator),
        );
        let deployment = Deployment::new(
            "demo",
            "site",
            DeploymentSpec {
                authors: InstanceSpec::new("small", 1),
                publishers: InstanceSpec::new("small", publishers),
                ..Default::default()
            },
        );
        cluster.upsert_deployment(deployment.clone());
        for ordinal in 1..=publishers {
            let name = instance_name("site", Runmode::Publish, ordinal);
            cluster.create_instance(&name, Runmode::Publish, &deployment).await.unwrap();
            secrets.ensure_password(&deployment, &name).await.unwrap();
        }
        let author = instance_name("site", Runmode::Author, 1);
        cluster.create_instance(&author, Runmode::Author, &deployment).await.unwrap();
        secrets.ensure_password(&deployment, &author).await.unwrap();

        let agents = AgentConfigurator::new(secrets.clone(), config.clone());
        Fixture {
            cluster,
            config,
            secrets,
            agents,
            deployment,
        }
    }

    fn split(f: &Fixture) -> (Instance, Vec<Instance>) {
        let all = f.cluster.instances("demo");
        let author = all.iter().find(|i| i.is_runmode(Runmode::Author)).cloned().unwrap();
        let publishers = all.into_iter().filter(|i| i.is_runmode(Runmode::Publish)).collect();
        (author, publishers)
    }

    /// Makes the instance accept its stored password, as after bootstrap.
    async fn unlock(f: &Fixture, inst: &Instance) {
        let pwd = f.secrets.password(&f.deployment, inst.name()).await.unwrap().unwrap();
        f.config.set_password(inst.address.as_deref().unwrap(), &pwd);
    }

    fn agent_names(f: &Fixture, inst: &Instance, kind: AgentKind) -> Vec<String> {
        let mut names: Vec<_> = f
            .config
            .agents(inst.address.as_deref().unwrap(), kind)
            .into_iter()
            .map(|a| a.name)
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn author_gets_one_agent_per_publisher() {
        let f = fixture(2).await;
        let (author, publishers) = split(&f);
        unlock(&f, &author).await;

        f.agents.converge_author(&f.deployment, &author, &publishers).await.unwrap();
        assert_eq!(
            agent_names(&f, &author, AgentKind::Author),
            vec!["site-publish-001", "site-publish-002"]
        );

        let records = f.config.agents(author.address.as_deref().unwrap(), AgentKind::Author);
        let first = records.iter().find(|a| a.name == "site-publish-001").unwrap();
        assert_eq!(
            first.properties["transportUri"],
            "http://site-publish-001.site:4503/bin/receive?sling:authRequestLogin=1"
        );
        assert_eq!(first.properties["grid"], true);
    }

    #[tokio::test]
    async fn author_drops_only_managed_stale_agents() {
        let f = fixture(1).await;
        let (author, publishers) = split(&f);
        let address = author.address.clone().unwrap();
        unlock(&f, &author).await;

        let mut managed = Map::new();
        managed.insert(AGENT_GRID_PROPERTY.into(), Value::Bool(true));
        let stale = AgentRecord {
            name: "site-publish-009".into(),
            properties: managed,
        };
        let manual = AgentRecord {
            name: "manual".into(),
            properties: Map::new(),
        };
        f.config.insert_agent(&address, AgentKind::Author, stale);
        f.config.insert_agent(&address, AgentKind::Author, manual);

        f.agents.converge_author(&f.deployment, &author, &publishers).await.unwrap();
        assert_eq!(agent_names(&f, &author, AgentKind::Author), vec!["manual", "site-publish-001"]);

        let applied = f.config.apply_count();
        f.agents.converge_author(&f.deployment, &author, &publishers).await.unwrap();
        assert_eq!(f.config.apply_count(), applied, "converged author must not be touched");
    }

    #[tokio::test]
    async fn publish_registers_dispatcher_once() {
        let f = fixture(1).await;
        let (_, publishers) = split(&f);
        let publish = &publishers[0];
        let address = publish.address.clone().unwrap();
        unlock(&f, publish).await;

        f.agents.converge_publish(&f.deployment, publish).await.unwrap();
        f.agents.converge_publish(&f.deployment, publish).await.unwrap();

        assert_eq!(agent_names(&f, publish, AgentKind::Publish), vec!["site-dispatcher-001"]);
        assert_eq!(f.config.apply_count(), 1);
        let records = f.config.agents(&address, AgentKind::Publish);
        assert_eq!(
            records[0].properties["transportUri"],
            "http://site-dispatcher-001.site.demo:80/dispatcher/invalidate.cache"
        );
    }

    #[tokio::test]
    async fn missing_credentials_abort() {
        let f = fixture(0).await;
        let (mut author, _) = split(&f);
        author.metadata.name = "site-author-002".into();
        let err = f.agents.converge_author(&f.deployment, &author, &[]).await;
        assert!(matches!(err, Err(CoreError::MissingCredentials(_))));
    }
}
