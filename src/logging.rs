//! Logging setup
//!
//! Engine logs go through `tracing`. Statements enabled by the show-SQL
//! toggle are emitted on the [`crate::engine::SQL_TARGET`] target.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global subscriber with an env filter and a fmt layer.
///
/// `RUST_LOG` overrides `default_filter` (e.g. `"ormcache=info"`). Returns
/// false if a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
