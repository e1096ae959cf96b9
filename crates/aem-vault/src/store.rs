use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use aem_core::{SecretError, SecretStore};
use aem_model::SecretData;

use crate::config::VaultConfig;
use crate::errors::VaultError;

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: SecretData,
}

#[derive(Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

/// [`SecretStore`] over the Vault HTTP API.
///
/// Paths are used as-is below `/v1/`, so `secret/demo/site/x` lives in
/// the KV mount `secret`. Missing secrets read as `None` and deleting them
/// succeeds.
#[derive(Clone, Debug)]
pub struct VaultSecretStore {
    client: Client,
    addr: String,
    token: String,
}

impl VaultSecretStore {
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            addr: config.addr.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_matches('/'))
    }

    pub async fn read(&self, path: &str) -> Result<Option<SecretData>, VaultError> {
        let resp = self
            .client
            .get(self.url(path))
            .header(TOKEN_HEADER, self.token.as_str())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, path).await?;
        let body: ReadResponse = resp.json().await.map_err(|e| VaultError::InvalidResponse {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(body.data))
    }

    pub async fn write(&self, path: &str, data: &SecretData) -> Result<(), VaultError> {
        let resp = self
            .client
            .put(self.url(path))
            .header(TOKEN_HEADER, self.token.as_str())
            .json(data)
            .send()
            .await?;
        check(resp, path).await?;
        trace!(%path, "secret written");
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> Result<(), VaultError> {
        let resp = self
            .client
            .delete(self.url(path))
            .header(TOKEN_HEADER, self.token.as_str())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp, path).await?;
        trace!(%path, "secret deleted");
        Ok(())
    }

    /// Keys directly below `prefix`; folders end with `/`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, VaultError> {
        let resp = self
            .client
            .get(format!("{}?list=true", self.url(prefix)))
            .header(TOKEN_HEADER, self.token.as_str())
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let resp = check(resp, prefix).await?;
        let body: ListResponse = resp.json().await.map_err(|e| VaultError::InvalidResponse {
            path: prefix.to_string(),
            reason: e.to_string(),
        })?;
        Ok(body.data.keys)
    }

    /// Deletes every secret below `prefix`, descending into folders.
    pub async fn remove_tree(&self, prefix: &str) -> Result<usize, VaultError> {
        let mut pending = vec![prefix.trim_matches('/').to_string()];
        let mut removed = 0;
        while let Some(dir) = pending.pop() {
            for key in self.list(&dir).await? {
                let child = format!("{dir}/{}", key.trim_end_matches('/'));
                if key.ends_with('/') {
                    pending.push(child);
                } else {
                    self.remove(&child).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

async fn check(resp: Response, path: &str) -> Result<Response, VaultError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(VaultError::Status {
        status: status.as_u16(),
        path: path.to_string(),
        body,
    })
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn get(&self, path: &str) -> Result<Option<SecretData>, SecretError> {
        Ok(self.read(path).await?)
    }

    async fn put(&self, path: &str, data: &SecretData) -> Result<(), SecretError> {
        Ok(self.write(path, data).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), SecretError> {
        Ok(self.remove(path).await?)
    }

    async fn clean_up(&self, prefix: &str) -> Result<(), SecretError> {
        let removed = self.remove_tree(prefix).await?;
        debug!(%prefix, removed, "secrets cleaned up");
        Ok(())
    }
}
