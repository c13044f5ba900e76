// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Non-sessioned receive -> dispatch -> dispose worker loop (spec §4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{
    error::{Phase, PumpError},
    handler::{ExceptionSink, MessageHandler, NullExceptionSink},
    interfaces::MessageReceiver,
    model::LockedMessage,
    options::MessageHandlerOptions,
    receive_mode::ReceiveMode,
    renewal,
};

/// Fixed receive timeout: large enough to minimize churn against the broker.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Owns the `maxConcurrentCalls` worker loops for a single non-sessioned
/// handler registration. Dropping or [`Self::shut_down`]-ing signals all
/// workers to exit after their current iteration settles.
pub(crate) struct MessagePump {
    closing: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl MessagePump {
    pub(crate) fn start<R, H>(
        receiver: Arc<R>,
        handler: Arc<H>,
        mode: ReceiveMode,
        options: MessageHandlerOptions,
        exception_sink: Arc<dyn ExceptionSink>,
    ) -> Self
    where
        R: MessageReceiver + 'static,
        H: MessageHandler<R::Message> + 'static,
    {
        let closing = Arc::new(AtomicBool::new(false));
        let workers = (0..options.max_concurrent_calls)
            .map(|_| {
                tokio::spawn(worker_loop(
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    mode,
                    options.clone(),
                    Arc::clone(&exception_sink),
                    Arc::clone(&closing),
                ))
            })
            .collect();

        Self { closing, workers }
    }

    /// Signals every worker loop to stop issuing new receives. Does not wait
    /// for in-flight work to settle; see [`Self::join`].
    pub(crate) fn shut_down(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    /// Waits for every worker loop to exit. Callers should call
    /// [`Self::shut_down`] first.
    pub(crate) async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop<R, H>(
    receiver: Arc<R>,
    handler: Arc<H>,
    mode: ReceiveMode,
    options: MessageHandlerOptions,
    exception_sink: Arc<dyn ExceptionSink>,
    closing: Arc<AtomicBool>,
) where
    R: MessageReceiver + 'static,
    H: MessageHandler<R::Message> + 'static,
{
    loop {
        if closing.load(Ordering::SeqCst) {
            return;
        }

        let message = match receiver.receive(RECEIVE_TIMEOUT).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(error) => {
                exception_sink.notify_exception(&error, Phase::Receive);
                continue;
            }
        };

        let message = Arc::new(message);
        let renewal_loop = if mode.is_peek_lock() {
            Some(renewal::start_message_renewal(
                Arc::clone(&receiver),
                Arc::clone(&message),
                chrono::Utc::now(),
                options.max_auto_renew_duration,
                Arc::clone(&exception_sink),
            ))
        } else {
            None
        };

        let outcome = handler.handle(&message).await;

        if let Some(renewal_loop) = &renewal_loop {
            renewal_loop.cancel();
            renewal_loop.join().await;
        }

        if let Err(error) = &outcome {
            exception_sink.notify_exception(
                &PumpError::user_callback_failure(format!("{error:?}")),
                Phase::UserCallback,
            );
        }

        if mode.is_peek_lock() {
            dispose(&receiver, &message, outcome.is_ok(), options.auto_complete, &exception_sink).await;
        }
    }
}

async fn dispose<R>(
    receiver: &Arc<R>,
    message: &Arc<R::Message>,
    callback_succeeded: bool,
    auto_complete: bool,
    exception_sink: &Arc<dyn ExceptionSink>,
) where
    R: MessageReceiver,
{
    let Some(lock_token) = message.lock_token() else {
        return;
    };

    if callback_succeeded {
        if !auto_complete {
            return;
        }
        if let Err(error) = receiver.complete(lock_token).await {
            exception_sink.notify_exception(&error, Phase::Complete);
        }
    } else if let Err(error) = receiver.abandon(lock_token).await {
        exception_sink.notify_exception(&error, Phase::Abandon);
    }
}

/// Convenience used by [`crate::pump::Pump`] to build a [`NullExceptionSink`]
/// when no sink was supplied at registration.
pub(crate) fn default_exception_sink() -> Arc<dyn ExceptionSink> {
    Arc::new(NullExceptionSink)
}
