//! Shared observability setup for stocktake processes.

/// Tracing configuration (filters, format).
pub mod tracing;

pub use tracing::LogFormat;

/// Initialize process-wide observability with environment-driven settings.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}
