use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use aem_model::{SecretData, SecretRecord};

use super::{Injected, lock};
use crate::collab::{SecretError, SecretStore};

#[derive(Debug, Default)]
struct State {
    data: BTreeMap<String, SecretData>,
    fail_next: Option<String>,
}

/// Path-keyed secret map.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    state: Mutex<State>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: SecretData) {
        lock(&self.state).data.insert(path.to_string(), data);
    }

    /// Stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        lock(&self.state).data.keys().cloned().collect()
    }

    pub fn password(&self, path: &str) -> Option<String> {
        lock(&self.state)
            .data
            .get(path)
            .and_then(SecretRecord::from_data)
            .map(|r| r.password)
    }

    /// Makes the next call fail with `message`.
    pub fn fail_next(&self, message: &str) {
        lock(&self.state).fail_next = Some(message.to_string());
    }

    fn check(&self) -> Result<(), SecretError> {
        match lock(&self.state).fail_next.take() {
            Some(msg) => Err(SecretError::backend(Injected(msg))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, path: &str) -> Result<Option<SecretData>, SecretError> {
        self.check()?;
        Ok(lock(&self.state).data.get(path).cloned())
    }

    async fn put(&self, path: &str, data: &SecretData) -> Result<(), SecretError> {
        self.check()?;
        self.insert(path, data.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), SecretError> {
        self.check()?;
        lock(&self.state).data.remove(path);
        Ok(())
    }

    async fn clean_up(&self, prefix: &str) -> Result<(), SecretError> {
        self.check()?;
        let nested = format!("{}/", prefix.trim_end_matches('/'));
        lock(&self.state)
            .data
            .retain(|path, _| path != prefix && !path.starts_with(&nested));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_up_respects_path_segments() {
        let store = MemorySecretStore::new();
        let data = SecretRecord::new("pw").to_data();
        store.insert("secret/demo/site/a", data.clone());
        store.insert("secret/demo/site2/a", data);

        store.clean_up("secret/demo/site").await.unwrap();
        assert_eq!(store.paths(), vec!["secret/demo/site2/a".to_string()]);
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let store = MemorySecretStore::new();
        store.fail_next("down");
        assert!(store.get("x").await.is_err());
        assert!(store.get("x").await.unwrap().is_none());
    }
}
