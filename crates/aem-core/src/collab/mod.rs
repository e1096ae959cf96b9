//! Interfaces to the systems the reconciler depends on but does not own.
//!
//! Every mutating call must be idempotent: creates treat "already exists" as
//! success and deletes treat "not found" as success. That, not locking, is
//! what makes retried and concurrent reconciliations safe.

mod error;
pub use error::{BoxError, ConfigError, SecretError, StoreError};

use async_trait::async_trait;

use aem_model::{
    Agent, AgentKind, AgentRecord, Deployment, Instance, Labels, ReconcileKey, Runmode,
    SecretData,
};

/// Local cache of desired-state resources, fed by the event source.
#[async_trait]
pub trait DeploymentCache: Send + Sync {
    async fn get(&self, key: &ReconcileKey) -> Result<Option<Deployment>, StoreError>;
}

/// Binding state of a persistent volume claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimPhase {
    Pending,
    Bound,
    Lost,
}

/// Cluster resources backing a deployment and its instances.
///
/// Manifest construction lives behind this trait; the reconciler only asks
/// for resources to exist or to be gone.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Headless discovery service addressing every instance of the deployment.
    async fn ensure_discovery_service(&self, deployment: &Deployment) -> Result<(), StoreError>;

    /// Shared configuration artifacts (dispatcher farms and virtual hosts).
    async fn ensure_base_config(&self, deployment: &Deployment) -> Result<(), StoreError>;

    async fn create_claim(&self, claim: &str, deployment: &Deployment) -> Result<(), StoreError>;

    async fn claim_phase(&self, claim: &str, namespace: &str) -> Result<ClaimPhase, StoreError>;

    async fn create_instance(
        &self,
        name: &str,
        runmode: Runmode,
        deployment: &Deployment,
    ) -> Result<(), StoreError>;

    /// Dedicated service plus routable ingress for one instance.
    async fn create_endpoint(
        &self,
        name: &str,
        runmode: Runmode,
        deployment: &Deployment,
    ) -> Result<(), StoreError>;

    /// Removes the ingress and then the service created by [`create_endpoint`].
    ///
    /// [`create_endpoint`]: ResourceStore::create_endpoint
    async fn delete_endpoint(&self, name: &str, namespace: &str) -> Result<(), StoreError>;

    async fn delete_claim(&self, claim: &str, namespace: &str) -> Result<(), StoreError>;

    async fn delete_instance(&self, name: &str, namespace: &str) -> Result<(), StoreError>;

    /// Persists `deployment.status`; last write wins.
    async fn update_status(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;

    /// Persists instance metadata (annotations).
    async fn update_instance(&self, instance: &Instance) -> Result<Instance, StoreError>;

    async fn list_instances(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<Instance>, StoreError>;
}

/// Path-keyed secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<SecretData>, SecretError>;
    async fn put(&self, path: &str, data: &SecretData) -> Result<(), SecretError>;
    async fn delete(&self, path: &str) -> Result<(), SecretError>;
    /// Deletes every secret stored under `prefix`.
    async fn clean_up(&self, prefix: &str) -> Result<(), SecretError>;
}

/// Where an instance's configuration API is reachable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceEndpoint {
    pub address: String,
    pub port: u16,
}

impl InstanceEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration API of a running instance.
#[async_trait]
pub trait InstanceConfigClient: Send + Sync {
    async fn list_agents(
        &self,
        endpoint: &InstanceEndpoint,
        credentials: &Credentials,
        kind: AgentKind,
    ) -> Result<Vec<AgentRecord>, ConfigError>;

    async fn apply_agents(
        &self,
        endpoint: &InstanceEndpoint,
        credentials: &Credentials,
        agents: &[Agent],
    ) -> Result<(), ConfigError>;

    async fn change_password(
        &self,
        endpoint: &InstanceEndpoint,
        user: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ConfigError>;
}
