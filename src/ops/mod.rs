//! Operations and observability.
//!
//! - [`telemetry`] - Tracing setup and process memory sampling
//! - [`version`] - Version information for status surfaces

pub mod telemetry;
pub mod version;
