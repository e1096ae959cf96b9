//! Vault KV (version 1) backend for instance credentials.

mod config;
pub use config::{ENV_VAULT_ADDR, ENV_VAULT_TOKEN, VaultConfig};

mod errors;
pub use errors::VaultError;

mod store;
pub use store::VaultSecretStore;
