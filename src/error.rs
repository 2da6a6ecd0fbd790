// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Driver error types and server error-code mapping.
//!
//! The server reports failures as a numeric code plus a UTF-8 message in the
//! response body. [`map_service_error`] turns that pair into a typed
//! [`NoSQLError`]; unknown codes fall back to [`ErrorCode::UnknownError`].
//!
//! # Example
//!
//! ```
//! use nosql_driver::error::{ErrorCode, NoSQLError, map_service_error};
//!
//! let err = map_service_error(50, "read rate exceeded".into());
//! assert!(err.is_retryable());
//! assert!(err.is_read_throttling());
//!
//! let err = map_service_error(2, "no such table".into());
//! assert_eq!(err.error_code(), Some(ErrorCode::TableNotFound));
//! assert!(!err.is_retryable());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Numeric error codes reported by the service, one byte on the wire.
///
/// Codes below 50 are caller errors, 50-53 are throttling, 100 and up are
/// server-side conditions. The split drives retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownOperation,
    TableNotFound,
    IndexNotFound,
    IllegalArgument,
    RowSizeLimitExceeded,
    KeySizeLimitExceeded,
    BatchOpNumberLimitExceeded,
    RequestSizeLimitExceeded,
    TableExists,
    IndexExists,
    InvalidAuthorization,
    InsufficientPermission,
    ResourceExists,
    ResourceNotFound,
    TableLimitExceeded,
    IndexLimitExceeded,
    BadProtocolMessage,
    EvolutionLimitExceeded,
    TableDeploymentLimitExceeded,
    TenantDeploymentLimitExceeded,
    OperationNotSupported,
    ReadLimitExceeded,
    WriteLimitExceeded,
    SizeLimitExceeded,
    OperationLimitExceeded,
    RequestTimeout,
    ServerError,
    ServiceUnavailable,
    TableBusy,
    SecurityInfoUnavailable,
    RetryAuthentication,
    UnknownError,
    IllegalState,
}

impl ErrorCode {
    /// Map a wire code to its enum value. Unknown codes become
    /// [`ErrorCode::UnknownError`].
    #[must_use]
    pub fn from_wire(code: u8) -> Self {
        match code {
            1 => Self::UnknownOperation,
            2 => Self::TableNotFound,
            3 => Self::IndexNotFound,
            4 => Self::IllegalArgument,
            5 => Self::RowSizeLimitExceeded,
            6 => Self::KeySizeLimitExceeded,
            7 => Self::BatchOpNumberLimitExceeded,
            8 => Self::RequestSizeLimitExceeded,
            9 => Self::TableExists,
            10 => Self::IndexExists,
            11 => Self::InvalidAuthorization,
            12 => Self::InsufficientPermission,
            13 => Self::ResourceExists,
            14 => Self::ResourceNotFound,
            15 => Self::TableLimitExceeded,
            16 => Self::IndexLimitExceeded,
            17 => Self::BadProtocolMessage,
            18 => Self::EvolutionLimitExceeded,
            19 => Self::TableDeploymentLimitExceeded,
            20 => Self::TenantDeploymentLimitExceeded,
            21 => Self::OperationNotSupported,
            50 => Self::ReadLimitExceeded,
            51 => Self::WriteLimitExceeded,
            52 => Self::SizeLimitExceeded,
            53 => Self::OperationLimitExceeded,
            100 => Self::RequestTimeout,
            101 => Self::ServerError,
            102 => Self::ServiceUnavailable,
            103 => Self::TableBusy,
            104 => Self::SecurityInfoUnavailable,
            105 => Self::RetryAuthentication,
            126 => Self::IllegalState,
            _ => Self::UnknownError,
        }
    }

    /// Whether a request failing with this code may succeed if re-sent.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ReadLimitExceeded
                | Self::WriteLimitExceeded
                | Self::OperationLimitExceeded
                | Self::ServerError
                | Self::ServiceUnavailable
                | Self::TableBusy
                | Self::SecurityInfoUnavailable
                | Self::RetryAuthentication
        )
    }
}

/// Error type for all driver operations.
///
/// Server-signalled failures carry an [`ErrorCode`]; local failures
/// (validation, transport, deadline) use dedicated variants. The root cause
/// of a timed-out request is preserved as the `source` of
/// [`NoSQLError::RequestTimeout`].
#[derive(Debug, Error)]
pub enum NoSQLError {
    /// Invalid caller input. Never retried.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Driver-side state error (unexpected result type, closed client).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The serialized request exceeded the size limit. Never retried.
    #[error("request size of {size} exceeded the limit of {limit}")]
    RequestSizeLimit { size: usize, limit: usize },

    /// A server-reported failure mapped from the wire error code.
    #[error("{code:?}: {message}")]
    Service { code: ErrorCode, message: String },

    /// Failure in the authorization provider itself.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure (connect, send, receive). Retried after a
    /// short cooldown.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single suspension point exceeded the remaining iteration budget.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The whole request budget was exhausted across all attempts.
    #[error("request timed out after {timeout_ms} ms: {message}")]
    RequestTimeout {
        timeout_ms: u64,
        message: String,
        #[source]
        source: Option<Box<NoSQLError>>,
    },
}

impl NoSQLError {
    /// The server error code, when this error came off the wire.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Service { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the retry loop may re-attempt the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service { code, .. } => code.is_retryable(),
            Self::Transport(_) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_read_throttling(&self) -> bool {
        self.error_code() == Some(ErrorCode::ReadLimitExceeded)
    }

    #[must_use]
    pub fn is_write_throttling(&self) -> bool {
        self.error_code() == Some(ErrorCode::WriteLimitExceeded)
    }

    /// Short label for retry-stats accounting.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Service { code, .. } => format!("{code:?}"),
            Self::IllegalArgument(_) => "IllegalArgument".into(),
            Self::IllegalState(_) => "IllegalState".into(),
            Self::RequestSizeLimit { .. } => "RequestSizeLimit".into(),
            Self::Authentication(_) => "Authentication".into(),
            Self::Transport(_) => "Transport".into(),
            Self::Timeout(_) => "Timeout".into(),
            Self::RequestTimeout { .. } => "RequestTimeout".into(),
        }
    }
}

/// Map a wire error code plus message to a typed error.
#[must_use]
pub fn map_service_error(code: u8, message: String) -> NoSQLError {
    NoSQLError::Service {
        code: ErrorCode::from_wire(code),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_codes_are_retryable() {
        for code in [50u8, 51, 53] {
            let err = map_service_error(code, "throttled".into());
            assert!(err.is_retryable(), "code {code} should be retryable");
        }
    }

    #[test]
    fn test_caller_errors_are_terminal() {
        for code in [2u8, 4, 8, 11, 12] {
            let err = map_service_error(code, "bad".into());
            assert!(!err.is_retryable(), "code {code} should be terminal");
        }
    }

    #[test]
    fn test_unknown_code_maps_to_unknown_error() {
        let err = map_service_error(200, "???".into());
        assert_eq!(err.error_code(), Some(ErrorCode::UnknownError));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_throttling_direction_helpers() {
        assert!(map_service_error(50, String::new()).is_read_throttling());
        assert!(map_service_error(51, String::new()).is_write_throttling());
        assert!(!map_service_error(50, String::new()).is_write_throttling());
    }

    #[test]
    fn test_request_timeout_preserves_source() {
        let cause = NoSQLError::Transport("connection reset".into());
        let err = NoSQLError::RequestTimeout {
            timeout_ms: 5000,
            message: "2 retries".into(),
            source: Some(Box::new(cause)),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("connection reset"));
    }

    #[test]
    fn test_security_info_unavailable_is_retryable() {
        let err = map_service_error(104, "not ready".into());
        assert_eq!(err.error_code(), Some(ErrorCode::SecurityInfoUnavailable));
        assert!(err.is_retryable());
    }
}
