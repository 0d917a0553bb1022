// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # VLT - Vehicle Log and Trace
//!
//! A pure Rust client library for the AUTOSAR DLT (Diagnostic Log and Trace)
//! protocol: applications register contexts, build typed log messages and
//! hand them to a DLT daemon, buffering locally while no daemon is around.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vlt::{LogLevel, Result, UserConfig, UserState};
//!
//! fn main() -> Result<()> {
//!     let state = UserState::new("EXMP", "example application", UserConfig::from_env())?;
//!     let ctx = state.register_context("MAIN", "main loop")?;
//!
//!     if let Some(mut msg) = state.log_start(&ctx, LogLevel::Info)? {
//!         msg.append_str("temperature")?;
//!         msg.append_f32(23.4)?;
//!         state.log_finish(msg)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Application Layer                            |
//! |    UserState -> Context handles -> MessageBuilder appends           |
//! +---------------------------------------------------------------------+
//! |                         Protocol Layer                              |
//! |    Storage/Standard/Extended headers | Verbose argument encoding    |
//! +---------------------------------------------------------------------+
//! |                         Buffering Layer                             |
//! |    Startup ring buffer (DltBuffer) | Stream reassembly (Receiver)   |
//! +---------------------------------------------------------------------+
//! |                         Transport Layer                             |
//! |    Daemon FIFO | Unix stream socket | In-memory capture             |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`UserState`] | Per-process logging state, factory for contexts |
//! | [`Context`] | Handle to a registered log context |
//! | [`MessageBuilder`] | In-progress message, typed argument appends |
//! | [`Message`] | Decoded or to-be-encoded wire frame |
//! | [`DltBuffer`] | Growable byte ring buffer for startup frames |
//! | [`Receiver`] | Buffering reader with partial-frame carryover |
//!
//! ## Modules Overview
//!
//! - [`user`] - Application-facing API (start here)
//! - [`protocol`] - Wire format: headers, arguments, framing
//! - [`buffer`] - The startup ring buffer
//! - [`receiver`] - Stream buffering and resynchronization
//! - [`transport`] - Daemon links
//! - [`config`] - Constants and environment-driven configuration

pub mod buffer;
pub mod config;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod transport;
pub mod user;

pub use buffer::DltBuffer;
pub use config::{LocalPrintMode, UserConfig};
pub use error::{DltError, Result};
pub use protocol::{
    Argument, ArgumentValue, Attributes, DecodeOutcome, DltId, ExtendedHeader, HeaderExtra,
    LogLevel, Message, StandardHeader, StorageHeader, TraceStatus,
};
pub use receiver::{GetFlags, Receiver, ReceiverKind};
pub use transport::{DaemonLink, FailMode, FifoLink, MemoryLink, SocketLink};
pub use user::{Context, MessageBuilder, UserState};
