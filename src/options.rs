// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration for registered handlers.

use std::time::Duration;

/// Default wall-clock bound on how long the pump will keep renewing a lock on
/// the user's behalf, if the caller does not override it.
const DEFAULT_MAX_AUTO_RENEW_DURATION: Duration = Duration::from_secs(5 * 60);

/// Options governing a non-sessioned [`MessageHandler`](crate::handler::MessageHandler)
/// registration.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct MessageHandlerOptions {
    /// Maximum number of callbacks the pump will run concurrently.
    #[builder(default = "1")]
    pub max_concurrent_calls: usize,
    /// Whether the pump automatically completes a message after a successful
    /// callback. If `false`, the user is responsible for disposing the message
    /// themselves (via the disposition façade) during the callback.
    #[builder(default = "true")]
    pub auto_complete: bool,
    /// Wall-clock bound, from message arrival, after which the pump stops
    /// renewing the message's lock regardless of whether the callback has
    /// completed.
    #[builder(default = "DEFAULT_MAX_AUTO_RENEW_DURATION")]
    pub max_auto_renew_duration: Duration,
}

impl MessageHandlerOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.max_concurrent_calls {
            return Err("max_concurrent_calls must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Options governing a sessioned [`SessionMessageHandler`](crate::handler::SessionMessageHandler)
/// registration.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SessionHandlerOptions {
    /// Maximum number of sessions the pump will have accepted and be pumping
    /// concurrently.
    #[builder(default = "1")]
    pub max_concurrent_sessions: usize,
    /// Maximum number of callbacks the pump will run concurrently per session.
    #[builder(default = "1")]
    pub max_concurrent_calls_per_session: usize,
    /// See [`MessageHandlerOptions::auto_complete`].
    #[builder(default = "true")]
    pub auto_complete: bool,
    /// See [`MessageHandlerOptions::max_auto_renew_duration`]. For sessions this
    /// bounds both an individual callback's renewal-cancel guard and the
    /// session-close handshake's renewal guard.
    #[builder(default = "DEFAULT_MAX_AUTO_RENEW_DURATION")]
    pub max_auto_renew_duration: Duration,
}

impl SessionHandlerOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.max_concurrent_sessions {
            return Err("max_concurrent_sessions must be at least 1".to_string());
        }
        if let Some(0) = self.max_concurrent_calls_per_session {
            return Err("max_concurrent_calls_per_session must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_handler_options_defaults() {
        let options = MessageHandlerOptionsBuilder::default().build().unwrap();
        assert_eq!(options.max_concurrent_calls, 1);
        assert!(options.auto_complete);
        assert_eq!(options.max_auto_renew_duration, DEFAULT_MAX_AUTO_RENEW_DURATION);
    }

    #[test]
    fn message_handler_options_rejects_zero_concurrency() {
        let result = MessageHandlerOptionsBuilder::default()
            .max_concurrent_calls(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn session_handler_options_rejects_zero_sessions() {
        let result = SessionHandlerOptionsBuilder::default()
            .max_concurrent_sessions(0usize)
            .build();
        assert!(result.is_err());
    }
}
