//! Error types for the its123 client
//!
//! Provides error handling for:
//! - Network and timeout failures reported by the transport
//! - Protocol violations in API responses
//! - Invalid configuration
//! - Failures of the rendering and submission capabilities
//!
//! Storage failures are absorbed by the store and never appear here.

use crate::events::EventKind;
use crate::render::RenderError;
use std::path::PathBuf;

/// Main client error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Non-2xx response
    #[error("network error {status}: {message}")]
    Network { status: u16, message: String },

    /// Request exceeded the configured timeout
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection-level failure without an HTTP status
    #[error("transport error: {0}")]
    Transport(String),

    /// Response violated the API contract
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Requested report type is not part of the product
    #[error("report not found: {0}")]
    ReportNotFound(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The submission source went away while waiting for input
    #[error("submission source closed while waiting for instrument {0}")]
    SubmissionClosed(String),

    /// Renderer failed to present content
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl ClientError {
    /// Status synthesized for local timeouts
    pub const TIMEOUT_STATUS: u16 = 408;

    /// Create network error
    #[inline]
    pub fn network(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
        }
    }

    /// HTTP status associated with the error, if any
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => Some(*status),
            Self::Timeout { .. } => Some(Self::TIMEOUT_STATUS),
            _ => None,
        }
    }

    /// Classify for callers deciding between "retry" and "contact support"
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { status, .. } => ErrorKind::from_status(*status),
            Self::Timeout { .. } | Self::Transport(_) => ErrorKind::Unavailable,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::ReportNotFound(_) => ErrorKind::NotFound,
            Self::Config(_) | Self::SubmissionClosed(_) | Self::Render(_) => ErrorKind::Unexpected,
        }
    }

    /// Check if a submission may be attempted again after this error
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Protocol(_) | Self::Config(_) | Self::SubmissionClosed(_)
        )
    }

    /// Check if the failure needs support rather than a retry
    #[inline]
    #[must_use]
    pub fn requires_support(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidApiKey | ErrorKind::NoProductAccess
        )
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401: API key rejected
    InvalidApiKey,
    /// 403: key valid but not entitled to the product
    NoProductAccess,
    /// 404: product, instrument or report unknown
    NotFound,
    /// 408 or connection failure
    Unavailable,
    /// 500
    Server,
    /// Response did not follow the API contract
    Protocol,
    /// Anything else
    Unexpected,
}

impl ErrorKind {
    /// Map an HTTP status
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::InvalidApiKey,
            403 => Self::NoProductAccess,
            404 => Self::NotFound,
            408 => Self::Unavailable,
            500 => Self::Server,
            _ => Self::Unexpected,
        }
    }

    /// Dedicated event announced alongside the generic `error` event
    #[must_use]
    pub fn event(&self) -> Option<EventKind> {
        match self {
            Self::InvalidApiKey => Some(EventKind::InvalidApiKey),
            Self::NoProductAccess => Some(EventKind::NoProductAccess),
            Self::NotFound => Some(EventKind::ProductNotFound),
            Self::Unavailable => Some(EventKind::ServiceUnavailable),
            Self::Server => Some(EventKind::ServerError),
            Self::Protocol | Self::Unexpected => None,
        }
    }
}

/// API contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Instrument status outside the known lifecycle
    #[error("unexpected instrument status '{0}'")]
    UnknownStatus(String),

    /// Required response header absent
    #[error("missing response header {0}")]
    MissingHeader(&'static str),

    /// Resource manifest header is not valid JSON
    #[error("invalid resource manifest: {0}")]
    InvalidManifest(String),

    /// Response body could not be decoded
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// Product has no report to render
    #[error("product has no reports")]
    NoReports,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// API key left empty or at its placeholder
    #[error("api key must be set, check the client configuration")]
    MissingApiKey,

    /// Domain is not an absolute http(s) URL
    #[error("invalid api domain: {0}")]
    InvalidDomain(String),

    /// TOML could not be parsed
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file unreadable
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sink for run failures (crash reporting, support tooling)
///
/// Only notified when `log_errors` is enabled in the configuration.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorReporter: Send + Sync {
    /// Report a failure with a short context label
    fn notify(&self, error: &ClientError, context: &str);
}
