//! Per-instance credentials: storage paths, generation and one-time bootstrap.

use std::sync::Arc;

use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use aem_model::{
    ADMIN_USER, Agent, AgentKind, DEFAULT_ADMIN_PASSWORD, Deployment, Instance, SecretRecord,
    instance_secret_path, secret_base_path,
};

use crate::CoreError;
use crate::collab::{
    Credentials, InstanceConfigClient, InstanceEndpoint, ResourceStore, SecretError, SecretStore,
};

/// Length of generated admin passwords.
pub const PASSWORD_LEN: usize = 20;

/// Name of the factory replication agent removed during bootstrap.
pub const DEFAULT_AGENT: &str = "publish";

/// Source of new admin passwords.
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random alphanumeric passwords of [`PASSWORD_LEN`] characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPasswordGenerator;

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect()
    }
}

/// Keeps exactly one credential record per author/publish instance.
#[derive(Clone)]
pub struct SecretLifecycle {
    secrets: Arc<dyn SecretStore>,
    config: Arc<dyn InstanceConfigClient>,
    passwords: Arc<dyn PasswordGenerator>,
}

impl SecretLifecycle {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        config: Arc<dyn InstanceConfigClient>,
        passwords: Arc<dyn PasswordGenerator>,
    ) -> Self {
        Self {
            secrets,
            config,
            passwords,
        }
    }

    /// Stored password of `instance`, if any.
    pub async fn password(
        &self,
        deployment: &Deployment,
        instance: &str,
    ) -> Result<Option<String>, SecretError> {
        let path = instance_secret_path(deployment.namespace(), deployment.name(), instance);
        let data = self.secrets.get(&path).await?;
        Ok(data.as_ref().and_then(SecretRecord::from_data).map(|r| r.password))
    }

    /// Returns the stored password, generating and persisting one first if needed.
    pub async fn ensure_password(
        &self,
        deployment: &Deployment,
        instance: &str,
    ) -> Result<String, SecretError> {
        if let Some(pwd) = self.password(deployment, instance).await? {
            return Ok(pwd);
        }
        let path = instance_secret_path(deployment.namespace(), deployment.name(), instance);
        let record = SecretRecord::new(self.passwords.generate());
        self.secrets.put(&path, &record.to_data()).await?;
        debug!(%path, "generated instance password");
        Ok(record.password)
    }

    /// Deletes the record of a single instance.
    pub async fn remove(&self, deployment: &Deployment, instance: &str) -> Result<(), SecretError> {
        let path = instance_secret_path(deployment.namespace(), deployment.name(), instance);
        self.secrets.delete(&path).await
    }

    /// Deletes every record of a deployment.
    pub async fn clean_up(&self, namespace: &str, deployment: &str) -> Result<(), SecretError> {
        self.secrets.clean_up(&secret_base_path(namespace, deployment)).await
    }

    /// Applies a generated admin password to `instance` once.
    ///
    /// The password is persisted before it is applied. Returns `false` when
    /// nothing had to be done.
    #[instrument(level = "debug", skip_all, fields(instance = instance.name()))]
    pub async fn bootstrap(
        &self,
        deployment: &Deployment,
        instance: &Instance,
        store: &dyn ResourceStore,
    ) -> Result<bool, CoreError> {
        if instance.is_initialized() {
            return Ok(false);
        }
        let Some(runmode) = instance.runmode() else {
            return Ok(false);
        };
        let profile = runmode.profile();
        if !profile.has_credentials {
            return Ok(false);
        }
        let address = instance
            .address
            .as_deref()
            .ok_or_else(|| CoreError::MissingAddress(instance.name().to_string()))?;
        let endpoint = InstanceEndpoint::new(address, profile.port);

        let password = self.ensure_password(deployment, instance.name()).await?;

        let factory = Credentials::new(ADMIN_USER, DEFAULT_ADMIN_PASSWORD);
        if let Err(e) = self.apply_password(&endpoint, &factory, &password).await {
            debug!(error = %e, "factory credentials rejected, instance likely bootstrapped before");
        }
        let current = Credentials::new(ADMIN_USER, password.as_str());
        if let Err(e) = self.apply_password(&endpoint, &current, &password).await {
            warn!(error = %e, "password bootstrap failed");
            return Err(e);
        }

        let mut updated = instance.clone();
        updated.mark_initialized();
        store.update_instance(&updated).await?;
        info!("instance initialized");
        Ok(true)
    }

    async fn apply_password(
        &self,
        endpoint: &InstanceEndpoint,
        credentials: &Credentials,
        password: &str,
    ) -> Result<(), CoreError> {
        self.config
            .apply_agents(endpoint, credentials, &[Agent::delete(AgentKind::Author, DEFAULT_AGENT)])
            .await?;
        self.config
            .change_password(endpoint, &credentials.user, &credentials.password, password)
            .await?;
        Ok(())
    }
}
