//! Logging setup
//!
//! JSON-formatted tracing output. `RUST_LOG` takes precedence over the
//! configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed, which callers embedding the
/// client in a larger application can safely ignore.
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()?;

    Ok(())
}
