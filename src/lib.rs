// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A concurrent message and session pump for Azure Service Bus style brokers.
//!
//! [`Pump`] pulls messages from a broker entity (queue or subscription) and
//! delivers them to a user-supplied callback under bounded concurrency,
//! renewing message or session locks for the duration of the callback and
//! disposing of each message according to the callback's outcome. It runs in
//! one of two mutually exclusive modes, chosen by which handler is
//! registered:
//!
//! - a non-sessioned handler ([`MessageHandler`](handler::MessageHandler)),
//!   pumped by `N` independent worker loops, or
//! - a sessioned handler ([`SessionMessageHandler`](handler::SessionMessageHandler)),
//!   pumped by an outer session-acceptance loop feeding per-session inner
//!   worker loops, with a drain-quorum tracker deciding when a session has
//!   gone idle and should be released.
//!
//! The pump is generic over [`ReceiverFactory`](interfaces::ReceiverFactory)
//! and never depends on a particular transport; callers supply the broker
//! binding.

#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

#[macro_use]
extern crate derive_builder;

pub mod error;
pub mod receive_mode;
pub mod model;
pub mod interfaces;
pub mod handler;
pub mod options;
mod renewal;
mod session_tracker;
mod message_pump;
mod session_pump;
mod disposition;
mod pump;

pub use error::{ErrorKind, Phase, PumpError};
pub use options::{
    MessageHandlerOptions, MessageHandlerOptionsBuilder, SessionHandlerOptions,
    SessionHandlerOptionsBuilder,
};
pub use pump::Pump;
pub use receive_mode::ReceiveMode;

/// Include the README doc on a struct when running doctests to validate that the code in the
/// README can compile to verify that it has not rotted.
#[doc = include_str!("../README.md")]
#[cfg(doctest)]
struct ReadmeDoctests;
