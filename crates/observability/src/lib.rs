//! Process-wide tracing setup shared by the engine binaries.

/// Tracing subscriber configuration.
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing with the format chosen by `WAYPOINT_LOG_FORMAT`
/// (`json` by default, `pretty` for local runs).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let format = std::env::var("WAYPOINT_LOG_FORMAT")
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();
    crate::tracing::init(format);
}
