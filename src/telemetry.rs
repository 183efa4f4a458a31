use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level;
/// output goes to stderr so command output on stdout stays machine-readable.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => pipeline_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// A bare level such as `debug` applies to this crate only, with dependencies
/// (reqwest, hyper) held at `warn`. Full directives pass through untouched.
fn pipeline_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    let directives = directives_for(log_level);
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
        value: directives,
        source,
    })
}

fn directives_for(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("warn,{}={}", PIPELINE_TARGET, level)
    }
}

const PIPELINE_TARGET: &str = env!("CARGO_CRATE_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_the_crate() {
        assert_eq!(directives_for(" debug "), "warn,hiring_pipeline=debug");
        pipeline_filter("debug").expect("scoped filter parses");
    }

    #[test]
    fn explicit_directives_are_kept() {
        assert_eq!(
            directives_for("info,hiring_pipeline::workflows::pipeline::ledger=trace"),
            "info,hiring_pipeline::workflows::pipeline::ledger=trace"
        );
    }

    #[test]
    fn invalid_level_is_reported() {
        match pipeline_filter("hiring_pipeline=loud") {
            Err(TelemetryError::EnvFilter { value, .. }) => {
                assert_eq!(value, "hiring_pipeline=loud")
            }
            other => panic!("expected filter error, got {other:?}"),
        }
    }
}
