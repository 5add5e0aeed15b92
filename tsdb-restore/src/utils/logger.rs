//! Logging configuration using tracing.
//!
//! The subscriber is built as a [`Dispatch`] and handed to the caller. The
//! binary installs it once as the global default; tests can scope it with
//! [`tracing::dispatcher::with_default`].

use tracing::Dispatch;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Build a log dispatcher with the specified level.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn build(level: &str) -> Dispatch {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    Dispatch::new(subscriber)
}
