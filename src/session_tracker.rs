// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-session drain-quorum tracking: decides when every inner worker of a
//! session has simultaneously observed "no message or exception" and the
//! session should be released back to the broker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    error::{Phase, PumpError},
    handler::{ExceptionSink, SessionMessageHandler},
    interfaces::SessionReceiver,
    renewal::RenewalLoop,
};

/// The outcome a parked inner worker is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// No decision has been made yet for the current parking epoch.
    Pending,
    /// A sibling received a message; resume receiving immediately.
    Retry,
    /// Every inner worker has parked; stop receiving, the session is draining.
    Stop,
}

struct TrackerState {
    parked: usize,
    sender: Option<watch::Sender<Verdict>>,
}

/// Tracks drain quorum for one accepted session and drives its release.
pub(crate) struct SessionTracker<S>
where
    S: SessionReceiver,
{
    worker_count: usize,
    state: Mutex<TrackerState>,
    session: Arc<S>,
    renewal_loop: Arc<RenewalLoop>,
    exception_sink: Arc<dyn ExceptionSink>,
    max_auto_renew_duration: Duration,
    release_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S> SessionTracker<S>
where
    S: SessionReceiver + 'static,
{
    pub(crate) fn new(
        session: Arc<S>,
        worker_count: usize,
        renewal_loop: Arc<RenewalLoop>,
        exception_sink: Arc<dyn ExceptionSink>,
        max_auto_renew_duration: Duration,
    ) -> Self {
        Self {
            worker_count,
            state: Mutex::new(TrackerState { parked: 0, sender: None }),
            session,
            renewal_loop,
            exception_sink,
            max_auto_renew_duration,
            release_handle: Mutex::new(None),
        }
    }

    /// Called by an inner worker that observed an empty receive or a receive
    /// error. Parks the caller, returning a receiver that resolves to
    /// [`Verdict::Retry`] if a sibling receives a message first, or
    /// [`Verdict::Stop`] once every inner worker has parked.
    ///
    /// When this call parks the last worker, it synchronously spawns the
    /// session release sequence (`on_close_session`, then close), whose
    /// completion the outer acceptance loop awaits via [`Self::take_release_handle`].
    pub(crate) fn should_retry_on_no_message_or_exception<H, M>(
        self: &Arc<Self>,
        handler: &Arc<H>,
    ) -> watch::Receiver<Verdict>
    where
        H: SessionMessageHandler<S, M> + 'static,
        M: crate::model::LockedMessage + Send + Sync + 'static,
    {
        let mut state = self.state.lock().expect("tracker mutex poisoned");

        let sender = state.sender.get_or_insert_with(|| watch::channel(Verdict::Pending).0);
        let receiver = sender.subscribe();

        state.parked += 1;
        let quorum_reached = state.parked >= self.worker_count;

        if quorum_reached {
            let sender = state.sender.take().expect("sender present, just inserted above");
            state.parked = 0;
            let _ = sender.send(Verdict::Stop);
            drop(state);
            self.begin_release(Arc::clone(handler));
        }

        receiver
    }

    /// Called by an inner worker that successfully received a message.
    /// Un-parks every sibling currently waiting on the active epoch's
    /// deferred result and resets the parked count for the next epoch.
    pub(crate) fn notify_message_received(&self) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        if let Some(sender) = state.sender.take() {
            let _ = sender.send(Verdict::Retry);
        }
        state.parked = 0;
    }

    /// Takes the release task's handle, if the session has begun draining. The
    /// outer acceptance loop awaits this (after joining the inner worker
    /// loops) before accepting a fresh session.
    pub(crate) fn take_release_handle(&self) -> Option<JoinHandle<()>> {
        self.release_handle.lock().expect("tracker mutex poisoned").take()
    }

    fn begin_release<H, M>(self: &Arc<Self>, handler: Arc<H>)
    where
        H: SessionMessageHandler<S, M> + 'static,
        M: crate::model::LockedMessage + Send + Sync + 'static,
    {
        let tracker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            log::info!("session {} draining, releasing session", tracker.session.session_id());

            let renewal_for_guard = Arc::clone(&tracker.renewal_loop);
            let guard = tokio::spawn(async move {
                tokio::time::sleep(tracker.max_auto_renew_duration).await;
                renewal_for_guard.cancel();
            });

            let close_result = handler.on_close_session(&tracker.session).await;
            guard.abort();

            // Defensive second cancel: idempotent, guards against the close
            // callback finishing before the guard timer task is scheduled away.
            tracker.renewal_loop.cancel();
            tracker.renewal_loop.join().await;

            if let Err(error) = close_result {
                tracker.exception_sink.notify_exception(
                    &PumpError::user_callback_failure(format!("{error:?}")),
                    Phase::UserCallback,
                );
            }

            if let Err(error) = tracker.session.close().await {
                tracker.exception_sink.notify_exception(&error, Phase::SessionClose);
            }
        });

        *self.release_handle.lock().expect("tracker mutex poisoned") = Some(handle);
    }
}
