use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use aem_vault::{VaultConfig, VaultError};

pub const ENV_EXTERNAL_DOMAIN: &str = "GRID_EXTERNAL_DOMAIN";
pub const ENV_NAMESPACE: &str = "DEV_OPERATOR_NAMESPACE";
pub const ENV_METRICS_ADDR: &str = "AEM_METRICS_ADDR";
pub const ENV_DEPLOYMENTS_FILE: &str = "AEM_DEPLOYMENTS_FILE";

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Error)]
pub enum OperatorConfigError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub vault: VaultConfig,
    /// DNS suffix of instance ingress hosts.
    pub external_domain: String,
    /// Restricts the operator to one namespace when set.
    pub namespace: Option<String>,
    pub metrics_addr: SocketAddr,
    /// JSON array of deployments loaded into the simulated cluster.
    pub deployments_file: Option<PathBuf>,
    /// How often simulated instances are brought up.
    pub kubelet_interval: Duration,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, OperatorConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, OperatorConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let vault = VaultConfig::from_lookup(&lookup)?;
        let external_domain =
            get(ENV_EXTERNAL_DOMAIN).ok_or(OperatorConfigError::Missing(ENV_EXTERNAL_DOMAIN))?;

        let raw_addr = get(ENV_METRICS_ADDR).unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = raw_addr.parse().map_err(|e: std::net::AddrParseError| {
            OperatorConfigError::Invalid {
                var: ENV_METRICS_ADDR,
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            vault,
            external_domain,
            namespace: get(ENV_NAMESPACE),
            metrics_addr,
            deployments_file: get(ENV_DEPLOYMENTS_FILE).map(PathBuf::from),
            kubelet_interval: Duration::from_secs(2),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("VAULT_ADDR", "http://vault:8200"),
        ("VAULT_TOKEN", "t"),
        (ENV_EXTERNAL_DOMAIN, "grid.example.com"),
    ];

    #[test]
    fn minimal_environment() {
        let cfg = OperatorConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(cfg.external_domain, "grid.example.com");
        assert_eq!(cfg.namespace, None);
        assert_eq!(cfg.metrics_addr.port(), 9090);
        assert!(cfg.deployments_file.is_none());
    }

    #[test]
    fn optional_values() {
        let mut pairs = BASE.to_vec();
        pairs.push((ENV_NAMESPACE, "dev"));
        pairs.push((ENV_METRICS_ADDR, "127.0.0.1:9100"));
        let cfg = OperatorConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.namespace.as_deref(), Some("dev"));
        assert_eq!(cfg.metrics_addr.port(), 9100);
    }

    #[test]
    fn required_values_are_fatal() {
        let err = OperatorConfig::from_lookup(lookup(&BASE[..2])).unwrap_err();
        assert!(matches!(err, OperatorConfigError::Missing(ENV_EXTERNAL_DOMAIN)));

        let err = OperatorConfig::from_lookup(lookup(&BASE[1..])).unwrap_err();
        assert!(matches!(err, OperatorConfigError::Vault(_)));
    }

    #[test]
    fn bad_metrics_address() {
        let mut pairs = BASE.to_vec();
        pairs.push((ENV_METRICS_ADDR, "nowhere"));
        assert!(matches!(
            OperatorConfig::from_lookup(lookup(&pairs)),
            Err(OperatorConfigError::Invalid { .. })
        ));
    }
}
