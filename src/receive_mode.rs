// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Receive mode shared by non-sessioned and sessioned receive.

/// Governs whether broker-side locks exist on a received message and whether
/// disposition actions are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveMode {
    /// The broker hands out a time-bounded lock with each received message. The
    /// consumer must dispose (complete/abandon/defer/dead-letter) before the lock
    /// expires, or the broker will make the message available again.
    PeekLock,
    /// The broker removes the message at delivery time. No disposition is possible
    /// or required, and no lock exists to renew.
    ReceiveAndDelete,
}

impl ReceiveMode {
    /// Returns true if this mode uses broker-side locks and disposition.
    #[must_use]
    pub fn is_peek_lock(self) -> bool {
        matches!(self, ReceiveMode::PeekLock)
    }
}
