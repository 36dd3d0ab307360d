//! Logging setup using `tracing-subscriber`.
//!
//! Logs go to stderr so stdout carries nothing but post lines.  The level is
//! controlled by `RUST_LOG` (default: `info`), e.g.
//! `RUST_LOG=reddit_monitor=debug` to trace every poll.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.  Call once, at the top of `main`.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
