// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The disposition façade exposed on [`crate::pump::Pump`]: pass-through
//! complete/abandon/defer/dead-letter operations for non-sessioned mode
//! (spec §4.6).

use std::sync::Arc;

use crate::{error::ErrorKind, error::PumpError, interfaces::MessageReceiver};

/// Pass-through disposition operations. Constructed internally by
/// [`crate::pump::Pump`] once a non-sessioned handler is registered; absent
/// (calls fail with [`ErrorKind::UnsupportedOperation`]) in sessioned mode,
/// because disposition must go through the session itself, which holds the
/// lock — not the pump.
pub(crate) enum Disposition<R>
where
    R: MessageReceiver,
{
    /// A non-sessioned receiver is registered; calls forward to it.
    NonSessioned(Arc<R>),
    /// A session handler is registered, or nothing is registered yet; every
    /// call fails.
    Unavailable,
}

impl<R> Disposition<R>
where
    R: MessageReceiver,
{
    fn unsupported(operation: &str) -> PumpError {
        ErrorKind::UnsupportedOperation(format!(
            "{operation} is not available: disposition must be performed on the session directly in sessioned mode"
        ))
        .into()
    }

    /// Completes (deletes) the message identified by `lock_token`.
    pub(crate) async fn complete(&self, lock_token: &str) -> Result<(), PumpError> {
        match self {
            Self::NonSessioned(receiver) => receiver.complete(lock_token).await,
            Self::Unavailable => Err(Self::unsupported("complete")),
        }
    }

    /// Releases the lock on the message identified by `lock_token`.
    pub(crate) async fn abandon(&self, lock_token: &str) -> Result<(), PumpError> {
        match self {
            Self::NonSessioned(receiver) => receiver.abandon(lock_token).await,
            Self::Unavailable => Err(Self::unsupported("abandon")),
        }
    }

    /// Defers the message identified by `lock_token`.
    ///
    /// Forwards to the inner receiver's own `defer`, not `abandon` — the
    /// matching disposition for the operation requested.
    pub(crate) async fn defer(&self, lock_token: &str) -> Result<(), PumpError> {
        match self {
            Self::NonSessioned(receiver) => receiver.defer(lock_token).await,
            Self::Unavailable => Err(Self::unsupported("defer")),
        }
    }

    /// Moves the message identified by `lock_token` to the dead-letter queue.
    pub(crate) async fn dead_letter(
        &self,
        lock_token: &str,
        reason: Option<String>,
        description: Option<String>,
    ) -> Result<(), PumpError> {
        match self {
            Self::NonSessioned(receiver) => receiver.dead_letter(lock_token, reason, description).await,
            Self::Unavailable => Err(Self::unsupported("dead_letter")),
        }
    }
}
