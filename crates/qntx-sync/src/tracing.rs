//! Log setup for processes running sync nodes, plus the segment prefixes
//! sync log lines start with.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Session summaries from sync, warnings from everything else.
pub const DEFAULT_FILTER: &str = "warn,qntx_sync=info";

/// Install the default subscriber. See [`init_with_filter`].
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Install a compact fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` when it is unset or unparsable.
///
/// Returns false if a global subscriber was already installed; the existing
/// one stays in place.
pub fn init_with_filter(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init()
        .is_ok()
}

/// QNTX segment prefixes for logging.
pub mod prefix {
    /// Peer reconciliation
    pub const SYNC: &str = "⇌";
    /// Graceful startup prefix
    pub const PULSE_OPEN: &str = "✿";
    /// Database operations prefix
    pub const DB: &str = "⊔";
}
