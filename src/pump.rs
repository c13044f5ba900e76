// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`Pump`]: the public entry point tying handler registration, the
//! disposition façade, and graceful close together.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::{
    disposition::Disposition,
    error::{ErrorKind, PumpError},
    handler::{ExceptionSink, MessageHandler, NullExceptionSink, SessionMessageHandler},
    interfaces::{MessageReceiver, ReceiverFactory, SessionReceiver},
    message_pump::MessagePump,
    options::{MessageHandlerOptions, SessionHandlerOptions},
    receive_mode::ReceiveMode,
    session_pump::SessionPump,
};

enum Registration<F>
where
    F: ReceiverFactory,
{
    Inert,
    NonSessioned { receiver: Arc<F::MessageReceiver>, worker: MessagePump },
    Sessioned { worker: SessionPump },
    Closed,
}

/// A message and session pump bound to one broker entity (queue or
/// subscription) reached through `F`.
///
/// Created inert; [`Self::register_message_handler`] or
/// [`Self::register_session_handler`] opens the handler's worker loops,
/// exactly one of which may ever be called on a given pump. [`Self::close`]
/// stops new receives/accepts and waits for in-flight work to drain.
pub struct Pump<F>
where
    F: ReceiverFactory,
{
    factory: Arc<F>,
    entity_path: String,
    mode: ReceiveMode,
    exception_sink: Arc<dyn ExceptionSink>,
    registration: AsyncMutex<Registration<F>>,
}

impl<F> Pump<F>
where
    F: ReceiverFactory + 'static,
{
    /// Creates an inert pump bound to `entity_path`, using
    /// [`NullExceptionSink`] until [`Self::with_exception_sink`] is called.
    #[must_use]
    pub fn new(factory: F, entity_path: impl Into<String>, mode: ReceiveMode) -> Self {
        Self {
            factory: Arc::new(factory),
            entity_path: entity_path.into(),
            mode,
            exception_sink: Arc::new(NullExceptionSink),
            registration: AsyncMutex::new(Registration::Inert),
        }
    }

    /// Replaces the exception sink. Must be called before registering a
    /// handler; it has no effect on an already-running handler's loops.
    #[must_use]
    pub fn with_exception_sink(mut self, exception_sink: impl ExceptionSink + 'static) -> Self {
        self.exception_sink = Arc::new(exception_sink);
        self
    }

    /// Registers a non-sessioned message handler, launching
    /// `options.max_concurrent_calls` worker loops. Fails with
    /// [`ErrorKind::UnsupportedOperation`] if a handler is already registered
    /// or the pump has been closed.
    pub async fn register_message_handler<H>(
        &self,
        handler: H,
        options: MessageHandlerOptions,
    ) -> Result<(), PumpError>
    where
        H: MessageHandler<<F::MessageReceiver as MessageReceiver>::Message> + 'static,
    {
        let mut registration = self.registration.lock().await;
        if !matches!(*registration, Registration::Inert) {
            return Err(already_registered());
        }

        let receiver = Arc::new(self.factory.create_receiver(&self.entity_path, self.mode).await?);
        log::info!("registered non-sessioned message handler for '{}'", self.entity_path);

        let worker = MessagePump::start(
            Arc::clone(&receiver),
            Arc::new(handler),
            self.mode,
            options,
            Arc::clone(&self.exception_sink),
        );

        *registration = Registration::NonSessioned { receiver, worker };
        Ok(())
    }

    /// Registers a sessioned message handler, launching
    /// `options.max_concurrent_sessions` outer acceptance loops. Fails with
    /// [`ErrorKind::UnsupportedOperation`] if a handler is already registered
    /// or the pump has been closed.
    pub async fn register_session_handler<H>(
        &self,
        handler: H,
        options: SessionHandlerOptions,
    ) -> Result<(), PumpError>
    where
        H: SessionMessageHandler<F::SessionReceiver, <F::SessionReceiver as MessageReceiver>::Message>
            + 'static,
    {
        let mut registration = self.registration.lock().await;
        if !matches!(*registration, Registration::Inert) {
            return Err(already_registered());
        }

        log::info!("registered session handler for '{}'", self.entity_path);

        let worker = SessionPump::start(
            Arc::clone(&self.factory),
            self.entity_path.clone(),
            Arc::new(handler),
            self.mode,
            options,
            Arc::clone(&self.exception_sink),
        );

        *registration = Registration::Sessioned { worker };
        Ok(())
    }

    /// Completes (deletes) the message identified by `lock_token`. Only
    /// meaningful with a non-sessioned [`ReceiveMode::PeekLock`] handler
    /// registered; fails with [`ErrorKind::UnsupportedOperation`] otherwise.
    pub async fn complete(&self, lock_token: &str) -> Result<(), PumpError> {
        self.disposition().await.complete(lock_token).await
    }

    /// Releases the lock on the message identified by `lock_token`.
    pub async fn abandon(&self, lock_token: &str) -> Result<(), PumpError> {
        self.disposition().await.abandon(lock_token).await
    }

    /// Defers the message identified by `lock_token`.
    pub async fn defer(&self, lock_token: &str) -> Result<(), PumpError> {
        self.disposition().await.defer(lock_token).await
    }

    /// Moves the message identified by `lock_token` to the dead-letter queue.
    pub async fn dead_letter(
        &self,
        lock_token: &str,
        reason: Option<String>,
        description: Option<String>,
    ) -> Result<(), PumpError> {
        self.disposition().await.dead_letter(lock_token, reason, description).await
    }

    /// Prevents new receives/accepts and waits for in-flight work to drain.
    /// Idempotent: closing an already-closed or never-registered pump is a
    /// no-op.
    pub async fn close(&self) -> Result<(), PumpError> {
        let mut registration = self.registration.lock().await;
        let previous = std::mem::replace(&mut *registration, Registration::Closed);
        match previous {
            Registration::Inert | Registration::Closed => Ok(()),
            Registration::NonSessioned { receiver, worker } => {
                worker.shut_down();
                worker.join().await;
                receiver.close().await
            }
            Registration::Sessioned { worker } => {
                worker.shut_down();
                worker.join().await;
                Ok(())
            }
        }
    }

    async fn disposition(&self) -> Disposition<F::MessageReceiver> {
        match &*self.registration.lock().await {
            Registration::NonSessioned { receiver, .. } => Disposition::NonSessioned(Arc::clone(receiver)),
            Registration::Sessioned { .. } | Registration::Inert | Registration::Closed => {
                Disposition::Unavailable
            }
        }
    }
}

fn already_registered() -> PumpError {
    ErrorKind::UnsupportedOperation(
        "a handler is already registered on this pump, or the pump has been closed".to_string(),
    )
    .into()
}
