use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Identifies exactly one deployment as `"{namespace}/{name}"`.
///
/// Keys are what the work queue deduplicates on; the reconciler resolves them
/// back into a cached deployment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconcileKey(String);

impl ReconcileKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            return Self(name.to_string());
        }
        Self(format!("{namespace}/{name}"))
    }

    /// Parse a raw key, rejecting empty names and extra separators.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok(Self(raw.to_string())),
            (Some(ns), Some(name), None) if !ns.is_empty() && !name.is_empty() => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(ModelError::InvalidKey(raw.to_string())),
        }
    }

    /// Namespace part; empty for cluster-scoped keys.
    pub fn namespace(&self) -> &str {
        self.0.split_once('/').map(|(ns, _)| ns).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, n)| n).unwrap_or(&self.0)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ReconcileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_joins_namespace_and_name() {
        let key = ReconcileKey::new("demo", "example-aem");
        assert_eq!(key.as_str(), "demo/example-aem");
        assert_eq!(key.namespace(), "demo");
        assert_eq!(key.name(), "example-aem");
    }

    #[test]
    fn parse_accepts_bare_name() {
        let key = ReconcileKey::parse("example-aem").unwrap();
        assert_eq!(key.namespace(), "");
        assert_eq!(key.name(), "example-aem");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ReconcileKey::parse("").is_err());
        assert!(ReconcileKey::parse("/name").is_err());
        assert!(ReconcileKey::parse("ns/").is_err());
        assert!(ReconcileKey::parse("a/b/c").is_err());
    }
}
