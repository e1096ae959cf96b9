use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid reconcile key: {0} (expected: namespace/name)")]
    InvalidKey(String),
    #[error("unknown runmode: {0} (expected: author|publish|dispatcher)")]
    UnknownRunmode(String),
}
