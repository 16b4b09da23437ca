//! Error types for the gRPC layer.
//!
//! [`Error`] wraps every engine error and adds the failures that only exist
//! once a real transport is involved. It implements `From<Error>` for
//! [`tonic::Status`] so handlers can return it with `?`.
//!
//! Statuses received from the wire travel the other way through
//! [`engine_error`], which keeps cancellation and expiry distinguishable for
//! the caller-side drivers.
//!
//! ## Error Cases
//! - `Engine`: a session, driver or handler error.
//! - `ChannelError`: an internal communication failure between tasks.
//! - `ServiceShutdown`: a call arrived while the host was shutting down.

use rivulet::Code;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type of the gRPC layer.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The engine ended the call with this status.
    #[error(transparent)]
    Engine(#[from] rivulet::Error),

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The host is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Engine(err) => engine_status(&err),
            Error::ChannelError { context } => Status::internal(format!("Channel error: {context}")),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

/// Maps an engine status code onto its gRPC equivalent.
pub const fn grpc_code(code: Code) -> tonic::Code {
    match code {
        Code::InvalidArgument => tonic::Code::InvalidArgument,
        Code::NotFound => tonic::Code::NotFound,
        Code::Internal => tonic::Code::Internal,
        Code::DeadlineExceeded => tonic::Code::DeadlineExceeded,
        Code::Cancelled => tonic::Code::Cancelled,
        Code::FailedPrecondition => tonic::Code::FailedPrecondition,
    }
}

/// The status sent to the caller for an engine error.
///
/// Validation, lookup and infrastructure errors carry their own message
/// unchanged, so a caller sees e.g. `Received a negative number: -4`.
pub fn engine_status(err: &rivulet::Error) -> Status {
    let message = match err {
        rivulet::Error::InvalidArgument { reason } | rivulet::Error::NotFound { reason } => {
            reason.clone()
        }
        rivulet::Error::Internal { context } => context.clone(),
        other => other.to_string(),
    };
    Status::new(grpc_code(err.code()), message)
}

/// Maps a status received from the counterpart onto an engine error.
pub fn engine_error(status: &Status) -> rivulet::Error {
    let message = status.message().to_string();
    match status.code() {
        tonic::Code::Cancelled => rivulet::Error::Cancelled,
        tonic::Code::DeadlineExceeded => rivulet::Error::DeadlineExceeded,
        tonic::Code::InvalidArgument => rivulet::Error::InvalidArgument { reason: message },
        tonic::Code::NotFound => rivulet::Error::NotFound { reason: message },
        tonic::Code::Internal => rivulet::Error::Internal { context: message },
        code => rivulet::Error::Transport {
            context: format!("{code:?}: {message}"),
        },
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Engine(engine_error(&status))
    }
}
