// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! User-supplied callbacks the pump invokes: the message/session handlers, and
//! the fire-and-forget exception sink that is the pump's entire observability
//! surface.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::{error::Phase, model::LockedMessage};

/// A user-supplied handler for non-sessioned messages.
///
/// Registered once per pump via
/// [`Pump::register_message_handler`](crate::pump::Pump::register_message_handler).
#[async_trait]
pub trait MessageHandler<M>: Send + Sync
where
    M: LockedMessage + Send + Sync + 'static,
{
    /// The error type returned on failure. Reported to the [`ExceptionSink`]
    /// tagged with [`Phase::UserCallback`] and treated as "abandon this message".
    type Error: Debug + Send + Sync + 'static;

    /// Processes one message. Returning `Err` abandons the message (in
    /// [`ReceiveMode::PeekLock`](crate::receive_mode::ReceiveMode::PeekLock)); returning
    /// `Ok` completes it, unless auto-complete is disabled.
    async fn handle(&self, message: &M) -> Result<(), Self::Error>;
}

/// A user-supplied handler for sessioned messages.
///
/// Registered once per pump via
/// [`Pump::register_session_handler`](crate::pump::Pump::register_session_handler).
#[async_trait]
pub trait SessionMessageHandler<S, M>: Send + Sync
where
    S: Send + Sync + 'static,
    M: LockedMessage + Send + Sync + 'static,
{
    /// The error type returned on failure. See [`MessageHandler::Error`].
    type Error: Debug + Send + Sync + 'static;

    /// Processes one message received within `session`.
    async fn handle(&self, session: &S, message: &M) -> Result<(), Self::Error>;

    /// Invoked exactly once per accepted session, when the drain quorum is
    /// reached and the session is about to be released. The default
    /// implementation does nothing.
    async fn on_close_session(&self, session: &S) -> Result<(), Self::Error> {
        let _ = session;
        Ok(())
    }
}

/// Fire-and-forget sink for faults that do not directly determine message
/// disposition. This is the pump's entire user-visible observability contract:
/// every reported fault carries a [`Phase`] identifying where in the pipeline it
/// occurred.
///
/// Implementations must not panic from `notify_exception` — it is called from
/// deep inside worker loops and a panic there would take down the loop.
pub trait ExceptionSink: Send + Sync {
    /// Reports `error`, which occurred during `phase`.
    fn notify_exception(&self, error: &crate::error::PumpError, phase: Phase);
}

/// An [`ExceptionSink`] that discards everything. Useful as a default when the
/// caller has no interest in observability beyond disposition outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExceptionSink;

impl ExceptionSink for NullExceptionSink {
    fn notify_exception(&self, error: &crate::error::PumpError, phase: Phase) {
        log::debug!("[{phase:?}] suppressed by NullExceptionSink: {error}");
    }
}

/// An [`ExceptionSink`] that forwards every report to the `log` facade at error
/// level. A reasonable default for applications that do not need programmatic
/// access to pump faults.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionSink;

impl ExceptionSink for LoggingExceptionSink {
    fn notify_exception(&self, error: &crate::error::PumpError, phase: Phase) {
        log::error!("[{phase:?}] {error}");
    }
}
