//! Telemetry for Waypoint
//!
//! Sets up `tracing` output and bridges router events into structured log lines

pub mod events;

use waypoint_config::TelemetryConfig;

pub use events::{attach, log_event};

/// Initialize the global subscriber from configuration
///
/// `RUST_LOG` is not consulted; `filter_override` (typically from the command
/// line) takes precedence over `log_filter`. An invalid directive falls back
/// to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &TelemetryConfig, filter_override: Option<&str>) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let directive = filter_override.unwrap_or(&config.log_filter);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(std::io::stderr);
        registry
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr);
        registry
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;
    }

    Ok(())
}
