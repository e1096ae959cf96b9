use thiserror::Error;

use crate::collab::{ConfigError, SecretError, StoreError};
use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Some instances are not healthy yet; the key is retried later.
    #[error("deployment {0} not ready")]
    NotReady(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A claim did not reach the bound state within its wait budget.
    #[error("claim {claim} not bound")]
    BindTimeout {
        claim: String,
        #[source]
        source: RetryError<StoreError>,
    },

    #[error("invalid wait configuration: {0}")]
    InvalidWait(String),

    #[error("instance {0} has no address yet")]
    MissingAddress(String),

    #[error("no stored credentials for instance {0}")]
    MissingCredentials(String),
}

impl CoreError {
    /// Expected while instances spin up; never escalates the deployment to `Failed`.
    #[inline]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, CoreError::NotReady(_))
    }
}
