use thiserror::Error;

use aem_core::SecretError;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("vault request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("vault returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("invalid vault response for {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("invalid vault address: {0}")]
    InvalidAddr(String),
}

impl From<VaultError> for SecretError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidResponse { path, reason } => SecretError::Invalid { path, reason },
            other => SecretError::backend(other),
        }
    }
}
