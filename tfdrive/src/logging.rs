//! Tracing setup for the `tfdrive` binary.
//!
//! Library code only emits events. Captured command output goes out on the
//! `tfdrive::output` target, so `RUST_LOG=tfdrive::output=info` shows terraform's
//! own output live while a command runs.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn,tfdrive::output=info` if unset.
/// Output: stderr, compact format.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tfdrive::output=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
