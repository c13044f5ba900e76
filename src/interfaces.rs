// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! External collaborators the pump consumes: the receiver and session
//! capabilities of a broker client, and the factory that produces them.
//!
//! These are the only points of contact between the pump and a concrete
//! transport. The pump is generic over them so that it never depends on any
//! particular broker protocol, the way `azure_iot_operations_protocol`'s RPC
//! and telemetry types are generic over `ManagedClient`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{error::PumpError, model::LockedMessage, receive_mode::ReceiveMode};

/// Disposition and lock-renewal operations available on a non-sessioned receiver,
/// and shared by a session (which is itself also a receiver scoped to its session).
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// The message type produced by this receiver.
    type Message: LockedMessage + Send + Sync + 'static;

    /// Waits up to `timeout` for a message. Returns `Ok(None)` on timeout with no
    /// message available, which is not an error.
    async fn receive(&self, timeout: std::time::Duration) -> Result<Option<Self::Message>, PumpError>;

    /// Completes (deletes) the message identified by `lock_token`.
    async fn complete(&self, lock_token: &str) -> Result<(), PumpError>;

    /// Releases the lock on the message identified by `lock_token`, making it
    /// available for redelivery.
    async fn abandon(&self, lock_token: &str) -> Result<(), PumpError>;

    /// Defers the message identified by `lock_token` for later explicit retrieval.
    async fn defer(&self, lock_token: &str) -> Result<(), PumpError>;

    /// Moves the message identified by `lock_token` to the dead-letter queue, with
    /// an optional operator-facing reason and description.
    async fn dead_letter(
        &self,
        lock_token: &str,
        reason: Option<String>,
        description: Option<String>,
    ) -> Result<(), PumpError>;

    /// Renews the broker-side lock on `message`, returning the new expiry instant.
    async fn renew_message_lock(&self, message: &Self::Message) -> Result<DateTime<Utc>, PumpError>;

    /// Closes the receiver. No further operations on it are meaningful afterwards.
    async fn close(&self) -> Result<(), PumpError>;
}

/// The superset of [`MessageReceiver`] held by an accepted session: it additionally
/// carries a session-level lock, independently renewable from any individual
/// message lock.
#[async_trait]
pub trait SessionReceiver: MessageReceiver {
    /// The broker-assigned identity of the session.
    fn session_id(&self) -> &str;

    /// The instant at which the session-level lock expires.
    fn locked_until(&self) -> DateTime<Utc>;

    /// Renews the session-level lock, returning the new expiry instant.
    async fn renew_lock(&self) -> Result<DateTime<Utc>, PumpError>;
}

/// Produces non-sessioned receivers and accepts sessions from a broker entity
/// (queue or subscription) at a given path.
#[async_trait]
pub trait ReceiverFactory: Send + Sync {
    /// The non-sessioned receiver type this factory produces.
    type MessageReceiver: MessageReceiver;
    /// The session receiver type this factory produces.
    type SessionReceiver: SessionReceiver<Message = <Self::MessageReceiver as MessageReceiver>::Message>;

    /// Creates a non-sessioned receiver bound to `entity_path` in `mode`.
    async fn create_receiver(
        &self,
        entity_path: &str,
        mode: ReceiveMode,
    ) -> Result<Self::MessageReceiver, PumpError>;

    /// Accepts the next available session from `entity_path` in `mode`. No
    /// particular session id is requested; the broker hands back whichever
    /// session it chooses.
    async fn accept_session(
        &self,
        entity_path: &str,
        mode: ReceiveMode,
    ) -> Result<Self::SessionReceiver, PumpError>;
}
