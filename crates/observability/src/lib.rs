//! Process-wide tracing setup shared by binaries and tests.

/// Tracing subscriber configuration and installation.
pub mod tracing;

pub use crate::tracing::ObservabilityConfig;

/// Install JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; only the first installed subscriber wins.
pub fn init() {
    tracing::init(&ObservabilityConfig::default());
}

/// Install logging with explicit settings. Same idempotence as [`init`].
pub fn init_with(config: &ObservabilityConfig) {
    tracing::init(config);
}
