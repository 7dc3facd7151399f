//! Logging setup for binaries and tests embedding this crate
//!
//! The library only emits `tracing` events. Installing a subscriber is left
//! to the host process; `init` is a convenience for hosts that have none.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `info`
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init() -> bool {
    init_with(DEFAULT_LOG_FILTER)
}

/// Like [`init`], with an explicit fallback filter such as `"kafka_bridge=debug"`
pub fn init_with(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        // the first call may race other tests; the second must never panic
        let _ = init();
        assert!(!init());
    }
}
