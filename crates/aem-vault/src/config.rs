use std::time::Duration;

use crate::errors::VaultError;

pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";

#[derive(Clone)]
pub struct VaultConfig {
    /// Base address, e.g. `http://vault:8200`.
    pub addr: String,
    pub token: String,
    pub timeout: Duration,
}

impl VaultConfig {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Reads [`ENV_VAULT_ADDR`] and [`ENV_VAULT_TOKEN`]; both are required.
    pub fn from_env() -> Result<Self, VaultError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VaultError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(VaultError::MissingEnv(key))
        };
        let addr = required(ENV_VAULT_ADDR)?;
        let token = required(ENV_VAULT_TOKEN)?;
        if !(addr.starts_with("http://") || addr.starts_with("https://")) {
            return Err(VaultError::InvalidAddr(addr));
        }
        Ok(Self::new(addr, token))
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_variables_are_required() {
        let err = VaultConfig::from_lookup(|k| (k == ENV_VAULT_ADDR).then(|| "http://v".into()))
            .unwrap_err();
        assert!(matches!(err, VaultError::MissingEnv(ENV_VAULT_TOKEN)));

        let err = VaultConfig::from_lookup(|_| Some(" ".into())).unwrap_err();
        assert!(matches!(err, VaultError::MissingEnv(ENV_VAULT_ADDR)));
    }

    #[test]
    fn address_needs_a_scheme() {
        let err = VaultConfig::from_lookup(|k| {
            Some(if k == ENV_VAULT_ADDR { "vault:8200" } else { "t" }.to_string())
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::InvalidAddr(_)));
    }

    #[test]
    fn token_is_not_printed() {
        let cfg = VaultConfig::new("http://vault:8200", "hunter2");
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
