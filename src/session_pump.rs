// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sessioned receive -> dispatch -> dispose: an outer session-acceptance loop
//! feeding per-session inner worker loops, coordinated by a [`SessionTracker`]
//! (spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ErrorKind, Phase, PumpError},
    handler::{ExceptionSink, SessionMessageHandler},
    interfaces::{MessageReceiver, ReceiverFactory, SessionReceiver},
    model::LockedMessage,
    options::SessionHandlerOptions,
    receive_mode::ReceiveMode,
    renewal::{self, RenewalLoop},
    session_tracker::{SessionTracker, Verdict},
};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Backoff after a session-accept failure that is either a plain timeout (no
/// session currently available) or a reported transient error.
const ACCEPT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Owns the `maxConcurrentSessions` outer acceptance loops for a single
/// sessioned handler registration.
pub(crate) struct SessionPump {
    closing: CancellationToken,
    outer_workers: Vec<JoinHandle<()>>,
}

impl SessionPump {
    pub(crate) fn start<F, H>(
        factory: Arc<F>,
        entity_path: String,
        handler: Arc<H>,
        mode: ReceiveMode,
        options: SessionHandlerOptions,
        exception_sink: Arc<dyn ExceptionSink>,
    ) -> Self
    where
        F: ReceiverFactory + 'static,
        H: SessionMessageHandler<F::SessionReceiver, <F::SessionReceiver as MessageReceiver>::Message>
            + 'static,
    {
        let closing = CancellationToken::new();
        let outer_workers = (0..options.max_concurrent_sessions)
            .map(|_| {
                tokio::spawn(outer_loop(
                    Arc::clone(&factory),
                    entity_path.clone(),
                    Arc::clone(&handler),
                    mode,
                    options.clone(),
                    Arc::clone(&exception_sink),
                    closing.clone(),
                ))
            })
            .collect();

        Self { closing, outer_workers }
    }

    /// Signals every outer and inner loop to stop, including any inner worker
    /// currently parked on the session tracker's drain-quorum wait -- see
    /// [`park_until_verdict`].
    pub(crate) fn shut_down(&self) {
        self.closing.cancel();
    }

    pub(crate) async fn join(self) {
        for worker in self.outer_workers {
            let _ = worker.await;
        }
    }
}

async fn outer_loop<F, H>(
    factory: Arc<F>,
    entity_path: String,
    handler: Arc<H>,
    mode: ReceiveMode,
    options: SessionHandlerOptions,
    exception_sink: Arc<dyn ExceptionSink>,
    closing: CancellationToken,
) where
    F: ReceiverFactory + 'static,
    H: SessionMessageHandler<F::SessionReceiver, <F::SessionReceiver as MessageReceiver>::Message>
        + 'static,
{
    loop {
        if closing.is_cancelled() {
            return;
        }

        let session = match factory.accept_session(&entity_path, mode).await {
            Ok(session) => Arc::new(session),
            Err(error) => {
                match error.kind() {
                    ErrorKind::Timeout => {}
                    ErrorKind::OperationCancelled => return,
                    _ => exception_sink.notify_exception(&error, Phase::AcceptSession),
                }
                tokio::time::sleep(ACCEPT_RETRY_BACKOFF).await;
                continue;
            }
        };

        let renewal_loop = Arc::new(renewal::start_session_renewal(
            Arc::clone(&session),
            Arc::clone(&exception_sink),
        ));

        let tracker = Arc::new(SessionTracker::new(
            Arc::clone(&session),
            options.max_concurrent_calls_per_session,
            Arc::clone(&renewal_loop),
            Arc::clone(&exception_sink),
            options.max_auto_renew_duration,
        ));

        let inner_workers: Vec<_> = (0..options.max_concurrent_calls_per_session)
            .map(|_| {
                tokio::spawn(inner_loop(
                    Arc::clone(&session),
                    Arc::clone(&handler),
                    Arc::clone(&tracker),
                    Arc::clone(&renewal_loop),
                    mode,
                    options.clone(),
                    Arc::clone(&exception_sink),
                    closing.clone(),
                ))
            })
            .collect();

        for worker in inner_workers {
            let _ = worker.await;
        }

        if let Some(release) = tracker.take_release_handle() {
            let _ = release.await;
        } else {
            // The session's workers exited (pump closing) without ever reaching
            // drain quorum; the renewal loop was never handed to a release task.
            renewal_loop.cancel();
            renewal_loop.join().await;
        }
    }
}

async fn inner_loop<S, H>(
    session: Arc<S>,
    handler: Arc<H>,
    tracker: Arc<SessionTracker<S>>,
    renewal_loop: Arc<RenewalLoop>,
    mode: ReceiveMode,
    options: SessionHandlerOptions,
    exception_sink: Arc<dyn ExceptionSink>,
    closing: CancellationToken,
) where
    S: SessionReceiver + 'static,
    H: SessionMessageHandler<S, S::Message> + 'static,
{
    loop {
        if closing.is_cancelled() {
            return;
        }

        let message = match session.receive(RECEIVE_TIMEOUT).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                if park_until_verdict(&tracker, &handler, &closing).await == Verdict::Stop {
                    return;
                }
                continue;
            }
            Err(error) => {
                exception_sink.notify_exception(&error, Phase::Receive);
                if park_until_verdict(&tracker, &handler, &closing).await == Verdict::Stop {
                    return;
                }
                continue;
            }
        };

        tracker.notify_message_received();

        let message = Arc::new(message);

        // Guards against a callback that runs long enough to starve the
        // session-level renewal loop's own cancellation; if the callback
        // overruns the auto-renew budget, the session lock is allowed to lapse
        // rather than renewing it indefinitely on the user's behalf.
        let renewal_guard = {
            let renewal_loop = Arc::clone(&renewal_loop);
            let max_auto_renew_duration = options.max_auto_renew_duration;
            tokio::spawn(async move {
                tokio::time::sleep(max_auto_renew_duration).await;
                renewal_loop.cancel();
            })
        };

        let outcome = handler.handle(&session, &message).await;
        renewal_guard.abort();

        if let Err(error) = &outcome {
            exception_sink.notify_exception(
                &PumpError::user_callback_failure(format!("{error:?}")),
                Phase::UserCallback,
            );
        }

        if mode.is_peek_lock() {
            dispose(&session, &message, outcome.is_ok(), options.auto_complete, &exception_sink).await;
        }
    }
}

/// Parks the calling inner worker on the tracker's drain-quorum wait, racing
/// it against `closing` so a parked worker unparks itself as soon as the pump
/// starts shutting down rather than waiting on a `watch` value that no
/// sibling is left to resolve (e.g. the last unparked worker observes
/// `closing` at its own top-of-loop check and returns without ever calling
/// [`SessionTracker::should_retry_on_no_message_or_exception`]).
async fn park_until_verdict<S, H>(
    tracker: &Arc<SessionTracker<S>>,
    handler: &Arc<H>,
    closing: &CancellationToken,
) -> Verdict
where
    S: SessionReceiver + 'static,
    H: SessionMessageHandler<S, S::Message> + 'static,
{
    let mut receiver = tracker.should_retry_on_no_message_or_exception(handler);
    if *receiver.borrow() == Verdict::Pending {
        tokio::select! {
            _ = receiver.changed() => {}
            () = closing.cancelled() => return Verdict::Stop,
        }
    }
    *receiver.borrow()
}

async fn dispose<S>(
    session: &Arc<S>,
    message: &Arc<S::Message>,
    callback_succeeded: bool,
    auto_complete: bool,
    exception_sink: &Arc<dyn ExceptionSink>,
) where
    S: SessionReceiver,
{
    let Some(lock_token) = message.lock_token() else {
        return;
    };

    if callback_succeeded {
        if !auto_complete {
            return;
        }
        if let Err(error) = session.complete(lock_token).await {
            exception_sink.notify_exception(&error, Phase::Complete);
        }
    } else if let Err(error) = session.abandon(lock_token).await {
        exception_sink.notify_exception(&error, Phase::Abandon);
    }
}
