//! Error types and web-layer mapping.
//!
//! bacex defines common error conditions for the codec, transport, storage,
//! and launch layers. The web layer maps them onto HTTP status codes; the
//! CLI boundary wraps them in `anyhow` context instead.

use thiserror::Error;

/// Common bacex error conditions.
#[derive(Debug, Error)]
pub enum BacexError {
    /// A received frame could not be decoded.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// A frame was shorter than its headers declare.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    TruncatedFrame { needed: usize, available: usize },

    /// No local UDP port could be bound.
    #[error("no usable BACnet port: tried {tried:?}")]
    PortsExhausted { tried: Vec<u16> },

    /// The peer answered a confirmed request with a BACnet Error PDU.
    #[error("device error: class={class} code={code}")]
    DeviceError { class: u32, code: u32 },

    /// The peer rejected a confirmed request.
    #[error("request rejected: reason={reason}")]
    Rejected { reason: u8 },

    /// The peer aborted a confirmed request.
    #[error("request aborted: reason={reason}")]
    Aborted { reason: u8 },

    /// A confirmed request got no answer within the retry budget.
    #[error("read timed out after {attempts} attempt(s): {target}")]
    ReadTimeout { target: String, attempts: u32 },

    /// No extraction map is available for the requested project.
    #[error("no extraction map found")]
    MapNotFound { project: Option<String> },

    /// An extraction map file could not be parsed at all.
    #[error("invalid extraction map {path}: {reason}")]
    InvalidMap { path: String, reason: String },

    /// A worker of this kind is already running.
    #[error("{worker} already running")]
    AlreadyRunning { worker: &'static str },

    /// Storage failure surfaced from SQLite.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The launch sequence failed before the entry point started.
    #[error("launch failed at step '{step}': {reason}")]
    LaunchFailed { step: &'static str, reason: String },

    /// The UI entry point's server never became reachable.
    #[error("web UI did not start within {timeout_secs} second(s) at {url}")]
    UiStartTimeout { url: String, timeout_secs: u64 },

    /// Invalid request from an HTTP client.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BacexError {
    /// Create a malformed-frame error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is scoped to a single point read. Point-level
    /// failures are recorded as error samples; they never abort the cycle.
    pub fn is_point_level(&self) -> bool {
        matches!(
            self,
            Self::DeviceError { .. }
                | Self::Rejected { .. }
                | Self::Aborted { .. }
                | Self::ReadTimeout { .. }
        )
    }
}

/// Result type using BacexError.
pub type BacexResult<T> = Result<T, BacexError>;

// ============================================================================
// Web-layer error mapping
// ============================================================================

/// HTTP status mapping for gateway errors.
pub struct HttpErrorMapping;

impl HttpErrorMapping {
    /// Map a BacexError to an HTTP status code.
    pub fn to_status(error: &BacexError) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match error {
            BacexError::InvalidRequest { .. } | BacexError::InvalidMap { .. } => {
                StatusCode::BAD_REQUEST
            }
            BacexError::MapNotFound { .. } => StatusCode::NOT_FOUND,
            BacexError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            BacexError::ReadTimeout { .. } | BacexError::UiStartTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            BacexError::PortsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_level_errors_do_not_abort_cycles() {
        assert!(BacexError::ReadTimeout {
            target: "analogInput,1".to_string(),
            attempts: 3,
        }
        .is_point_level());
        assert!(BacexError::DeviceError { class: 2, code: 32 }.is_point_level());
        assert!(!BacexError::PortsExhausted { tried: vec![47808] }.is_point_level());
    }

    #[test]
    fn already_running_maps_to_conflict() {
        let err = BacexError::AlreadyRunning {
            worker: "discovery",
        };
        assert_eq!(
            HttpErrorMapping::to_status(&err),
            axum::http::StatusCode::CONFLICT
        );
    }
}
