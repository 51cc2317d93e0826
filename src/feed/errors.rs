//! Error types for the data-acquisition layer.
//!
//! Two layers of error live here:
//! - [`FetchError`]: what actually went wrong talking to the upstream feed,
//!   with enough detail for logs.
//! - [`FailureClass`]: the coarse class a page failure is reported as to the
//!   user. Messages for a class never include upstream detail (keys, URLs,
//!   raw bodies).

use std::fmt;

use thiserror::Error;

/// Failure of an upstream request (feed batch or media preload).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The service answered with a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// No usable response: connection refused, DNS, TLS, timeout.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// A response arrived but its body was not the expected shape.
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
}

impl FetchError {
    /// Map this failure onto the class shown to the user.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Status { status, .. } if (500..600).contains(status) => {
                FailureClass::UpstreamServerError
            }
            Self::Status { status, .. } if (400..500).contains(status) => {
                FailureClass::UpstreamClientError
            }
            _ => FailureClass::UpstreamUnknownError,
        }
    }

    /// Full detail for logs: class code plus the underlying error.
    pub fn log_message(&self) -> String {
        format!("[{}] {}", self.class().code(), self)
    }

    /// HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }
}

/// User-facing class of a failed page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// 5xx-class answer.
    UpstreamServerError,
    /// 4xx-class answer, e.g. invalid key or a date range the feed rejects.
    UpstreamClientError,
    /// Anything else, including network-level failure.
    UpstreamUnknownError,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl FailureClass {
    /// Short message for the alert shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::UpstreamServerError => "The picture service is having trouble right now.",
            Self::UpstreamClientError => "The picture service rejected the request.",
            Self::UpstreamUnknownError => "Could not reach the picture service.",
        }
    }

    /// Recovery suggestion for this class.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::UpstreamServerError => "Wait a moment, then change the date range to try again.",
            Self::UpstreamClientError => {
                "Check the API key and that the dates are not in the future or before 1995-06-16."
            }
            Self::UpstreamUnknownError => "Check your network connection and try again.",
        }
    }

    /// Stable identifier used in machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UpstreamServerError => "upstream_server_error",
            Self::UpstreamClientError => "upstream_client_error",
            Self::UpstreamUnknownError => "upstream_unknown_error",
        }
    }

    /// Whether repeating the same request later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UpstreamClientError)
    }
}
