// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for the message and session pump.

use thiserror::Error;

/// Represents an error that occurred in the pump.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct PumpError(#[from] ErrorKind);

impl PumpError {
    /// Returns the [`ErrorKind`] of the error.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Creates a new [`PumpError`] of kind [`ErrorKind::UserCallbackFailure`].
    #[must_use]
    pub fn user_callback_failure(message: impl Into<String>) -> Self {
        ErrorKind::UserCallbackFailure(message.into()).into()
    }
}

/// Represents the kinds of errors that occur in the pump.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A network or transport error that may succeed if retried.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    /// The operation timed out waiting for the broker; for receive and accept-session
    /// this is interpreted as "nothing available right now", not a failure.
    #[error("operation timed out")]
    Timeout,
    /// The operation was cancelled because the underlying entity is gone (e.g. the
    /// receiver or session was closed out from under an in-flight call).
    #[error("operation was cancelled")]
    OperationCancelled,
    /// The lock on a message has been lost; further renewal of it is pointless.
    #[error("message lock was lost")]
    MessageLockLost,
    /// The lock on a session has been lost; further renewal of it is pointless.
    #[error("session lock was lost")]
    SessionLockLost,
    /// The user-supplied callback returned an error.
    #[error("user callback failed: {0}")]
    UserCallbackFailure(String),
    /// A disposition call (complete/abandon/defer/dead-letter) failed.
    #[error("disposition failed: {0}")]
    DispositionFailure(String),
    /// The operation is not supported in the pump's current mode, e.g. calling the
    /// disposition façade while a session handler is registered, or registering a
    /// second handler on the same pump.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),
}

/// Identifies which phase of the pump's pipeline an error was reported from.
///
/// This is the entirety of the pump's observability contract: every fault that does
/// not directly become a disposition decision is reported through
/// [`ExceptionSink::notify_exception`](crate::handler::ExceptionSink::notify_exception)
/// tagged with one of these phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A call to receive a message (non-sessioned) or from a session.
    Receive,
    /// The user-supplied message or session callback.
    UserCallback,
    /// A `complete` disposition call.
    Complete,
    /// An `abandon` disposition call.
    Abandon,
    /// A renewal of a message lock.
    RenewMessageLock,
    /// A renewal of a session lock.
    RenewSessionLock,
    /// A call to accept a session.
    AcceptSession,
    /// A call to close a session.
    SessionClose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_pump_error() {
        let err: PumpError = ErrorKind::MessageLockLost.into();
        assert_eq!(err.kind(), &ErrorKind::MessageLockLost);
    }

    #[test]
    fn user_callback_failure_wraps_message() {
        let err = PumpError::user_callback_failure("boom");
        match err.kind() {
            ErrorKind::UserCallbackFailure(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
