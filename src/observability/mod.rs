//! # Observability
//!
//! Diagnostic logging goes to stderr through `tracing`; progress lines for
//! the operator go to stdout through a `Reporter`. `RUST_LOG`, when set,
//! takes precedence over the requested level.

use tracing_subscriber::EnvFilter;

use crate::provisioning::{ProvisionError, ProvisionResult};

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Parse a level name (`error`, `warn`, `info`, `debug`, `trace`)
pub fn parse_level(level: &str) -> ProvisionResult<tracing::Level> {
    level
        .trim()
        .parse::<tracing::Level>()
        .map_err(|_| ProvisionError::config(format!("unknown log level '{}'", level)))
}

fn filter_for(level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()))
}

/// Install the global stderr subscriber. Later calls are no-ops.
pub fn init_logging(level: &str) -> ProvisionResult<()> {
    let level = parse_level(level)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}
