//! Error types for the streaming call engine.
//!
//! Every fallible path in a session ends in exactly one [`Error`], and every
//! [`Error`] maps onto exactly one transport-neutral [`Code`]. Transport crates
//! translate [`Code`] into their own status representation.
//!
//! ## Taxonomy
//! - Validation (`InvalidArgument`): rejected before any side effect.
//! - Lookup (`NotFound`): a well-formed identifier matched nothing.
//! - Infrastructure (`Internal`, `Transport`): store, cursor, translation or
//!   channel failures. Never retried here.
//! - Temporal (`DeadlineExceeded`, `Cancelled`): in-flight work stops.
//! - Protocol (`SessionClosed`): a send or receive on a path that is already
//!   closed.

use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Transport-neutral status code carried by every terminal error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    Internal,
    DeadlineExceeded,
    Cancelled,
    FailedPrecondition,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::Internal => "Internal",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Cancelled => "Cancelled",
            Self::FailedPrecondition => "FailedPrecondition",
        };
        f.write_str(name)
    }
}

/// Unified error type for call sessions, drivers and handlers.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A send or receive was attempted on a closed path, or after the session
    /// emitted its terminal status.
    #[error("Session closed: {context}")]
    SessionClosed { context: &'static str },

    /// Caller-supplied data was rejected before any side effect.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A well-formed identifier did not match any record.
    #[error("Not found: {reason}")]
    NotFound { reason: String },

    /// Store, cursor or translation failure.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The session deadline elapsed before the work completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The session was cancelled by the counterpart, the host, or a
    /// disconnect.
    #[error("Request cancelled")]
    Cancelled,

    /// The underlying transport reported a failure that has no more specific
    /// mapping.
    #[error("Transport error: {context}")]
    Transport { context: String },
}

impl Error {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// The status code surfaced to the caller for this error.
    pub const fn code(&self) -> Code {
        match self {
            Self::SessionClosed { .. } => Code::FailedPrecondition,
            Self::InvalidArgument { .. } => Code::InvalidArgument,
            Self::NotFound { .. } => Code::NotFound,
            Self::Internal { .. } | Self::Transport { .. } => Code::Internal,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::Cancelled => Code::Cancelled,
        }
    }

    /// Whether this error stems from the session clock or cancellation rather
    /// than from the data or infrastructure.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            context: format!("record translation failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(Error::invalid_argument("x").code(), Code::InvalidArgument);
        assert_eq!(Error::not_found("x").code(), Code::NotFound);
        assert_eq!(Error::internal("x").code(), Code::Internal);
        assert_eq!(
            Error::Transport {
                context: "reset".into()
            }
            .code(),
            Code::Internal
        );
        assert_eq!(Error::DeadlineExceeded.code(), Code::DeadlineExceeded);
        assert_eq!(Error::Cancelled.code(), Code::Cancelled);
        assert!(Error::Cancelled.is_temporal());
        assert!(!Error::internal("x").is_temporal());
    }

    #[test]
    fn translation_failures_are_internal() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert_eq!(Error::from(err).code(), Code::Internal);
    }
}
