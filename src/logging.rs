//! Tracing setup for embedders that do not install their own subscriber.
//!
//! The storage, durability, and query layers all emit structured events
//! (tx ids, record gids, WAL segment names); this installs a global `fmt`
//! subscriber that renders them.

use crate::error::{GraphError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber filtered by `directives`, e.g.
/// `"duskdb=debug"`. An empty string falls back to the `RUST_LOG`
/// environment variable, then to `duskdb=info`. Fails when a subscriber
/// is already installed.
pub fn init(directives: &str) -> Result<()> {
    let filter = if directives.is_empty() {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("duskdb=info"))
    } else {
        EnvFilter::try_new(directives).map_err(|e| {
            GraphError::InvalidArgument(format!("invalid log filter '{directives}': {e}"))
        })?
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| GraphError::InvalidArgument(format!("subscriber already installed: {e}")))
}
