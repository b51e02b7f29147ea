//! Telemetry initialization (normal rust tracing, fmt subscriber).
//!
//! Log levels are controlled through the standard `RUST_LOG` environment
//! variable, defaulting to `info` when unset:
//!
//! ```bash
//! export RUST_LOG="jsonly=debug"
//! ```

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with console output
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");

    Ok(())
}
