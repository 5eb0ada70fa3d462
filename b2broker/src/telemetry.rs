//! Tracing initialization.
//!
//! Sets up `tracing-subscriber` with console output and an environment-driven
//! filter. The default filter keeps broker and HTTP-layer logs at `info`;
//! override with the standard `RUST_LOG` variable, e.g.
//! `RUST_LOG=b2broker=debug,tower_http=debug`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing with console output (fmt layer).
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("b2broker=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
