//! Subscriber assembly.
//!
//! Records emitted inside a reconcile pass carry the `sync{key=ns/name}`
//! span; scaling adds `deployment` and `runmode`. Text output prints the span
//! chain in front of each line, json attaches the innermost span.

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Crates a bare level such as `debug` applies to. Everything else logs at `warn`.
const OPERATOR_TARGETS: &[&str] = &[
    "aem_core",
    "aem_vault",
    "aem_prometheus",
    "aem_observe",
    "aem_operatord",
];

#[cfg(all(target_os = "linux", feature = "journald"))]
const SYSLOG_IDENTIFIER: &str = "aem-operatord";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    let output = output_layer(cfg)?;
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInstalled);
    }
    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()?;
    Ok(())
}

/// A bare level is scoped to [`OPERATOR_TARGETS`]; anything containing `=`
/// or `,` is used verbatim as an `EnvFilter` directive.
pub(crate) fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let directive = expand_level(level);
    EnvFilter::builder()
        .parse(&directive)
        .map_err(|source| LoggerError::BadDirective {
            directive: level.to_string(),
            source,
        })
}

fn expand_level(level: &str) -> String {
    let level = level.trim();
    if level.contains(['=', ',']) {
        return level.to_string();
    }
    OPERATOR_TARGETS
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={level}"))
}

fn output_layer(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    let layer = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(cfg.with_spans)
            .with_span_list(false)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Journald => journald_layer()?,
    };
    Ok(layer)
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(LoggerError::Journald)?
        .with_syslog_identifier(SYSLOG_IDENTIFIER.to_string());
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_operator_crates() {
        let directive = expand_level(" debug ");
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("aem_core=debug"));
        assert!(directive.contains("aem_operatord=debug"));
        assert!(mk_filter("debug").is_ok());
    }

    #[test]
    fn full_directive_is_kept() {
        assert_eq!(expand_level("info,hyper=warn"), "info,hyper=warn");
        assert_eq!(expand_level("aem_vault=trace"), "aem_vault=trace");
    }

    #[test]
    fn bad_directive_is_reported_as_given() {
        match mk_filter("loud") {
            Err(LoggerError::BadDirective { directive, .. }) => assert_eq!(directive, "loud"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn json_layer_builds() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Json,
            ..LoggerConfig::default()
        };
        assert!(output_layer(&cfg).is_ok());
    }

    #[test]
    fn second_install_is_refused() {
        let cfg = LoggerConfig::default();
        let _ = install(&cfg);
        assert!(matches!(install(&cfg), Err(LoggerError::AlreadyInstalled)));
    }
}
