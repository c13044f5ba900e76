// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bespoke in-memory fakes for the pump's collaborator traits.
//!
//! Async trait objects with concurrently-running call sites don't compose
//! well with `mockall`'s expectation model, so these are hand-written: each
//! fake records what happened in a `Mutex` and is driven by an unbounded
//! channel of scripted events rather than a fixed timeout, so tests run at
//! the speed of the scheduler, not the wall clock.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initializes `env_logger` so a test run with `RUST_LOG` set surfaces the
/// pump's own `log::debug!`/`log::info!` output (renewal scheduling, session
/// drain/release). Safe to call from every test: `try_init` ignores the
/// "already initialized" error from a prior call in the same test binary.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

use async_trait::async_trait;
use azure_service_bus_pump::error::{ErrorKind, PumpError};
use azure_service_bus_pump::handler::ExceptionSink;
use azure_service_bus_pump::interfaces::{MessageReceiver, ReceiverFactory, SessionReceiver};
use azure_service_bus_pump::model::LockedMessage;
use azure_service_bus_pump::receive_mode::ReceiveMode;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;

/// A scripted outcome for one `receive`/`accept_session` call.
pub enum FakeEvent<T> {
    Item(T),
    Empty,
    Error(ErrorKind),
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub lock_token: Option<String>,
    pub locked_until: DateTime<Utc>,
}

impl FakeMessage {
    pub fn peek_lock(id: impl Into<String>, validity: Duration) -> Self {
        let id = id.into();
        Self {
            lock_token: Some(format!("lock-{id}")),
            locked_until: Utc::now() + chrono::Duration::from_std(validity).unwrap(),
            id,
        }
    }

    pub fn receive_and_delete(id: impl Into<String>) -> Self {
        Self { id: id.into(), lock_token: None, locked_until: Utc::now() }
    }
}

impl LockedMessage for FakeMessage {
    fn message_id(&self) -> &str {
        &self.id
    }
    fn lock_token(&self) -> Option<&str> {
        self.lock_token.as_deref()
    }
    fn locked_until(&self) -> DateTime<Utc> {
        self.locked_until
    }
}

/// Records every disposition/renewal call made against it.
#[derive(Default)]
pub struct CallLog {
    pub completed: Mutex<Vec<String>>,
    pub abandoned: Mutex<Vec<String>>,
    pub deferred: Mutex<Vec<String>>,
    pub dead_lettered: Mutex<Vec<String>>,
    pub renewed: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

pub struct FakeReceiver {
    events: AsyncMutex<UnboundedReceiver<FakeEvent<FakeMessage>>>,
    pub log: Arc<CallLog>,
}

impl FakeReceiver {
    /// Returns the receiver, its event sender, and a shared handle on its
    /// call log that remains valid after the receiver is moved into a
    /// [`FakeFactory`] and consumed by the pump.
    pub fn new() -> (Self, UnboundedSender<FakeEvent<FakeMessage>>, Arc<CallLog>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let log = Arc::new(CallLog::default());
        (Self { events: AsyncMutex::new(receiver), log: Arc::clone(&log) }, sender, log)
    }
}

#[async_trait]
impl MessageReceiver for FakeReceiver {
    type Message = FakeMessage;

    async fn receive(&self, _timeout: Duration) -> Result<Option<Self::Message>, PumpError> {
        let event = self.events.lock().await.recv().await;
        match event {
            Some(FakeEvent::Item(message)) => Ok(Some(message)),
            Some(FakeEvent::Empty) | None => Ok(None),
            Some(FakeEvent::Error(kind)) => Err(kind.into()),
        }
    }

    async fn complete(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.completed.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn abandon(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.abandoned.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn defer(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.deferred.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn dead_letter(
        &self,
        lock_token: &str,
        _reason: Option<String>,
        _description: Option<String>,
    ) -> Result<(), PumpError> {
        self.log.dead_lettered.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn renew_message_lock(&self, message: &Self::Message) -> Result<DateTime<Utc>, PumpError> {
        self.log.renewed.lock().unwrap().push(message.id.clone());
        Ok(Utc::now() + chrono::Duration::seconds(30))
    }

    async fn close(&self) -> Result<(), PumpError> {
        *self.log.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Records invocations against an [`azure_service_bus_pump::handler::ExceptionSink`].
#[derive(Default)]
pub struct RecordingExceptionSink {
    pub reports: Mutex<Vec<(String, azure_service_bus_pump::error::Phase)>>,
}

impl ExceptionSink for RecordingExceptionSink {
    fn notify_exception(&self, error: &PumpError, phase: azure_service_bus_pump::error::Phase) {
        self.reports.lock().unwrap().push((error.to_string(), phase));
    }
}

pub struct FakeSession {
    pub session_id: String,
    events: AsyncMutex<UnboundedReceiver<FakeEvent<FakeMessage>>>,
    locked_until: DateTime<Utc>,
    pub log: Arc<CallLog>,
}

impl FakeSession {
    /// See [`FakeReceiver::new`] for why the call log is returned separately.
    pub fn new(
        session_id: impl Into<String>,
        validity: Duration,
    ) -> (Self, UnboundedSender<FakeEvent<FakeMessage>>, Arc<CallLog>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let log = Arc::new(CallLog::default());
        (
            Self {
                session_id: session_id.into(),
                events: AsyncMutex::new(receiver),
                locked_until: Utc::now() + chrono::Duration::from_std(validity).unwrap(),
                log: Arc::clone(&log),
            },
            sender,
            log,
        )
    }
}

#[async_trait]
impl MessageReceiver for FakeSession {
    type Message = FakeMessage;

    async fn receive(&self, _timeout: Duration) -> Result<Option<Self::Message>, PumpError> {
        let event = self.events.lock().await.recv().await;
        match event {
            Some(FakeEvent::Item(message)) => Ok(Some(message)),
            Some(FakeEvent::Empty) | None => Ok(None),
            Some(FakeEvent::Error(kind)) => Err(kind.into()),
        }
    }

    async fn complete(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.completed.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn abandon(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.abandoned.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn defer(&self, lock_token: &str) -> Result<(), PumpError> {
        self.log.deferred.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn dead_letter(
        &self,
        lock_token: &str,
        _reason: Option<String>,
        _description: Option<String>,
    ) -> Result<(), PumpError> {
        self.log.dead_lettered.lock().unwrap().push(lock_token.to_string());
        Ok(())
    }

    async fn renew_message_lock(&self, message: &Self::Message) -> Result<DateTime<Utc>, PumpError> {
        self.log.renewed.lock().unwrap().push(message.id.clone());
        Ok(Utc::now() + chrono::Duration::seconds(30))
    }

    async fn close(&self) -> Result<(), PumpError> {
        *self.log.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[async_trait]
impl SessionReceiver for FakeSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn locked_until(&self) -> DateTime<Utc> {
        self.locked_until
    }

    async fn renew_lock(&self) -> Result<DateTime<Utc>, PumpError> {
        self.log.renewed.lock().unwrap().push(format!("session:{}", self.session_id));
        Ok(Utc::now() + chrono::Duration::seconds(30))
    }
}

/// Hands out a single pre-built non-sessioned receiver, or a queue of
/// pre-built sessions (one per `accept_session` call). Exhausting the session
/// queue yields [`ErrorKind::OperationCancelled`], simulating teardown.
pub struct FakeFactory {
    receiver: Mutex<Option<FakeReceiver>>,
    sessions: Mutex<std::collections::VecDeque<Result<FakeSession, ErrorKind>>>,
}

impl FakeFactory {
    pub fn with_receiver(receiver: FakeReceiver) -> Self {
        Self { receiver: Mutex::new(Some(receiver)), sessions: Mutex::new(std::collections::VecDeque::new()) }
    }

    pub fn with_sessions(sessions: Vec<Result<FakeSession, ErrorKind>>) -> Self {
        Self { receiver: Mutex::new(None), sessions: Mutex::new(sessions.into()) }
    }
}

#[async_trait]
impl ReceiverFactory for FakeFactory {
    type MessageReceiver = FakeReceiver;
    type SessionReceiver = FakeSession;

    async fn create_receiver(
        &self,
        _entity_path: &str,
        _mode: ReceiveMode,
    ) -> Result<Self::MessageReceiver, PumpError> {
        self.receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ErrorKind::UnsupportedOperation("receiver already taken".to_string()).into())
    }

    async fn accept_session(
        &self,
        _entity_path: &str,
        _mode: ReceiveMode,
    ) -> Result<Self::SessionReceiver, PumpError> {
        match self.sessions.lock().unwrap().pop_front() {
            Some(Ok(session)) => Ok(session),
            Some(Err(kind)) => Err(kind.into()),
            None => Err(ErrorKind::OperationCancelled.into()),
        }
    }
}

/// Always succeeds; records every `(session_id, message_id)` pair handled and
/// whether `on_close_session` was invoked.
#[derive(Default)]
pub struct ScriptedSessionHandler {
    pub handled: Mutex<Vec<(String, String)>>,
    pub closed_sessions: Mutex<Vec<String>>,
}

#[async_trait]
impl azure_service_bus_pump::handler::SessionMessageHandler<FakeSession, FakeMessage>
    for ScriptedSessionHandler
{
    type Error = String;

    async fn handle(&self, session: &FakeSession, message: &FakeMessage) -> Result<(), Self::Error> {
        self.handled.lock().unwrap().push((session.session_id.clone(), message.id.clone()));
        Ok(())
    }

    async fn on_close_session(&self, session: &FakeSession) -> Result<(), Self::Error> {
        self.closed_sessions.lock().unwrap().push(session.session_id.clone());
        Ok(())
    }
}

/// Always succeeds or always fails, depending on construction.
pub struct ScriptedMessageHandler {
    pub should_fail: bool,
    pub invocations: Mutex<usize>,
}

impl ScriptedMessageHandler {
    pub fn succeeding() -> Self {
        Self { should_fail: false, invocations: Mutex::new(0) }
    }
    pub fn failing() -> Self {
        Self { should_fail: true, invocations: Mutex::new(0) }
    }
}

#[async_trait]
impl azure_service_bus_pump::handler::MessageHandler<FakeMessage> for ScriptedMessageHandler {
    type Error = String;

    async fn handle(&self, _message: &FakeMessage) -> Result<(), Self::Error> {
        *self.invocations.lock().unwrap() += 1;
        if self.should_fail { Err("callback failed".to_string()) } else { Ok(()) }
    }
}
