// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The pump treats received messages as opaque beyond the handful of properties
//! it needs to schedule renewal and disposition.

use chrono::{DateTime, Utc};

/// Properties the pump needs from a received message, regardless of payload type
/// or wire format. The payload itself is never inspected by the pump.
pub trait LockedMessage: Send + Sync {
    /// The broker-assigned identity of the message.
    fn message_id(&self) -> &str;

    /// The opaque token required to dispose of this message, present only when
    /// received under [`ReceiveMode::PeekLock`](crate::receive_mode::ReceiveMode::PeekLock).
    fn lock_token(&self) -> Option<&str>;

    /// The instant at which the broker-side lock on this message expires.
    ///
    /// Meaningless (and never read) when the message was received under
    /// [`ReceiveMode::ReceiveAndDelete`](crate::receive_mode::ReceiveMode::ReceiveAndDelete).
    fn locked_until(&self) -> DateTime<Utc>;
}
