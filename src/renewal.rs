// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The abstract renewal loop (spec §4.1) and its message/session
//! specializations (§4.2, §4.3).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ErrorKind, Phase, PumpError},
    handler::ExceptionSink,
    interfaces::{MessageReceiver, SessionReceiver},
    model::LockedMessage,
};

/// Minimum lock validity assumed when `locked_until` has already passed by the
/// time a renewal is scheduled. Compensates for clock skew between this process
/// and the broker without giving up on renewal entirely.
const MIN_LOCK_VALIDITY: Duration = Duration::from_secs(4);

/// Upper bound on the safety buffer subtracted from the remaining lock time
/// before scheduling a renew call, so that very long locks still renew on a
/// reasonable cadence.
const MAX_RENEW_BUFFER: Duration = Duration::from_secs(10);

/// Floor under any computed sleep so a failing renewal cannot spin in a tight
/// loop against the broker.
const MIN_RENEW_DELAY: Duration = Duration::from_millis(250);

/// Something whose lock can be renewed: a single in-flight message, or an
/// accepted session.
#[async_trait]
pub(crate) trait Renewable: Send + Sync {
    /// Issues the renew call, returning the new lock expiry on success.
    async fn renew(&self) -> Result<DateTime<Utc>, PumpError>;
}

/// Computes how long to sleep before issuing the next renew call, per the
/// interval policy: `buffer = min(remaining/2, MAX_RENEW_BUFFER)`, sleep for
/// `remaining - buffer`, treating a negative `remaining` as
/// [`MIN_LOCK_VALIDITY`].
fn next_delay(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = locked_until - now;
    let remaining = if remaining <= chrono::Duration::zero() {
        chrono::Duration::from_std(MIN_LOCK_VALIDITY).expect("fixed constant fits")
    } else {
        remaining
    };

    let max_buffer = chrono::Duration::from_std(MAX_RENEW_BUFFER).expect("fixed constant fits");
    let buffer = remaining / 2;
    let buffer = if buffer > max_buffer { max_buffer } else { buffer };

    let sleep = remaining - buffer;
    sleep.to_std().unwrap_or(Duration::ZERO).max(MIN_RENEW_DELAY)
}

/// Runs the renewal loop for a single [`Renewable`] target until cancelled, or
/// until `stop_at` (if present) is reached, or until a terminal error occurs.
pub(crate) struct RenewalLoop {
    cancellation_token: CancellationToken,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl RenewalLoop {
    /// Starts the loop as a background task.
    pub(crate) fn start<R>(
        target: Arc<R>,
        initial_locked_until: DateTime<Utc>,
        stop_at: Option<DateTime<Utc>>,
        phase: Phase,
        exception_sink: Arc<dyn ExceptionSink>,
    ) -> Self
    where
        R: Renewable + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            target,
            initial_locked_until,
            stop_at,
            phase,
            exception_sink,
            cancellation_token.clone(),
        ));

        Self {
            cancellation_token,
            handle: AsyncMutex::new(Some(handle)),
        }
    }

    /// Requests termination. Idempotent and safe to call from any task,
    /// including the loop's own task.
    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Waits for the background task to actually exit. Always safe to call,
    /// including after a previous call has already consumed the handle.
    pub(crate) async fn join(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run<R>(
        target: Arc<R>,
        mut locked_until: DateTime<Utc>,
        stop_at: Option<DateTime<Utc>>,
        phase: Phase,
        exception_sink: Arc<dyn ExceptionSink>,
        cancellation_token: CancellationToken,
    ) where
        R: Renewable,
    {
        loop {
            if cancellation_token.is_cancelled() {
                return;
            }
            if let Some(stop_at) = stop_at {
                if locked_until >= stop_at {
                    log::debug!("[{phase:?}] auto-renew budget exhausted, stopping renewal loop");
                    return;
                }
            }

            let delay = next_delay(locked_until, Utc::now());
            tokio::select! {
                () = cancellation_token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            // A cancellation may have raced in while the timer fired; re-check before
            // issuing the renew so that a concurrently-cancelled loop never renews again.
            if cancellation_token.is_cancelled() {
                return;
            }

            match target.renew().await {
                Ok(new_locked_until) => {
                    locked_until = new_locked_until;
                }
                Err(error) => {
                    let terminal = matches!(
                        error.kind(),
                        ErrorKind::MessageLockLost
                            | ErrorKind::SessionLockLost
                            | ErrorKind::OperationCancelled
                    );
                    exception_sink.notify_exception(&error, phase);
                    if terminal {
                        return;
                    }
                    // Non-terminal: loop back around. `locked_until` is now stale, so
                    // `next_delay` will likely compute a near-zero delay, clamped to
                    // `MIN_RENEW_DELAY`, yielding a prompt retry without spinning.
                }
            }
        }
    }
}

/// Adapts a single in-flight message for the abstract renewal loop.
pub(crate) struct MessageRenewTarget<R>
where
    R: MessageReceiver,
{
    receiver: Arc<R>,
    message: Arc<R::Message>,
}

impl<R> MessageRenewTarget<R>
where
    R: MessageReceiver,
{
    pub(crate) fn new(receiver: Arc<R>, message: Arc<R::Message>) -> Self {
        Self { receiver, message }
    }
}

#[async_trait]
impl<R> Renewable for MessageRenewTarget<R>
where
    R: MessageReceiver,
{
    async fn renew(&self) -> Result<DateTime<Utc>, PumpError> {
        self.receiver.renew_message_lock(&self.message).await
    }
}

/// Adapts an accepted session for the abstract renewal loop.
pub(crate) struct SessionRenewTarget<S>
where
    S: SessionReceiver,
{
    session: Arc<S>,
}

impl<S> SessionRenewTarget<S>
where
    S: SessionReceiver,
{
    pub(crate) fn new(session: Arc<S>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<S> Renewable for SessionRenewTarget<S>
where
    S: SessionReceiver,
{
    async fn renew(&self) -> Result<DateTime<Utc>, PumpError> {
        self.session.renew_lock().await
    }
}

/// Starts a message renewal loop for `message`, stopping cleanly once
/// `message`'s lock would extend past `arrival_time + max_auto_renew_duration`.
pub(crate) fn start_message_renewal<R>(
    receiver: Arc<R>,
    message: Arc<R::Message>,
    arrival_time: DateTime<Utc>,
    max_auto_renew_duration: Duration,
    exception_sink: Arc<dyn ExceptionSink>,
) -> RenewalLoop
where
    R: MessageReceiver + 'static,
{
    let locked_until = message.locked_until();
    let stop_at = arrival_time
        + chrono::Duration::from_std(max_auto_renew_duration).unwrap_or(chrono::Duration::zero());
    let target = Arc::new(MessageRenewTarget::new(receiver, message));
    RenewalLoop::start(
        target,
        locked_until,
        Some(stop_at),
        Phase::RenewMessageLock,
        exception_sink,
    )
}

/// Starts a session renewal loop for `session`. Runs until explicitly cancelled;
/// there is no auto-renew budget for sessions (spec §4.3).
pub(crate) fn start_session_renewal<S>(
    session: Arc<S>,
    exception_sink: Arc<dyn ExceptionSink>,
) -> RenewalLoop
where
    S: SessionReceiver + 'static,
{
    let locked_until = session.locked_until();
    let target = Arc::new(SessionRenewTarget::new(session));
    RenewalLoop::start(target, locked_until, None, Phase::RenewSessionLock, exception_sink)
}
