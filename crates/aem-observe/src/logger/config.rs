use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Env var holding the filter directive, e.g. `info,aem_core=debug`.
pub const ENV_LOG_LEVEL: &str = "AEM_LOG_LEVEL";
/// Env var selecting `text`, `json` or `journald`.
pub const ENV_LOG_FORMAT: &str = "AEM_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Attach the active span (e.g. the reconcile key) to json records.
    pub with_spans: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
            with_spans: true,
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by [`ENV_LOG_LEVEL`] and [`ENV_LOG_FORMAT`].
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`LoggerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            cfg.level = level.trim().to_string();
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}
