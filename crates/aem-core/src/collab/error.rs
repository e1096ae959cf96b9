use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("conflict writing {0}: object was modified")]
    Conflict(String),

    #[error("resource store request failed: {0}")]
    Api(#[source] BoxError),
}

impl StoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn api(err: impl Into<BoxError>) -> Self {
        StoreError::Api(err.into())
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[inline]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("secret backend request failed: {0}")]
    Backend(#[source] BoxError),

    #[error("invalid secret at {path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl SecretError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        SecretError::Backend(err.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("authentication failed for {user} at {address}")]
    Unauthorized { user: String, address: String },

    #[error("instance {address} rejected request: {reason}")]
    Rejected { address: String, reason: String },

    #[error("instance request failed: {0}")]
    Transport(#[source] BoxError),
}

impl ConfigError {
    pub fn transport(err: impl Into<BoxError>) -> Self {
        ConfigError::Transport(err.into())
    }
}
