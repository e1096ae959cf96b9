use thiserror::Error;
use tracing_subscriber::{filter::ParseError, util::TryInitError};

/// Failures turning the `AEM_LOG_*` settings into the global subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, want text, json or journald")]
    UnknownFormat(String),
    #[error("journald output needs linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("cannot connect to journald")]
    Journald(#[source] std::io::Error),
    #[error("bad log filter {directive:?}")]
    BadDirective {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("a global subscriber is already installed")]
    AlreadyInstalled,
    #[error("installing the subscriber failed")]
    Install(#[from] TryInitError),
}
