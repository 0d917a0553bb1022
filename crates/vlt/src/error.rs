// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! DLT is lossy by design under backpressure: most of these variants are
//! flow-control outcomes the caller recovers from locally (retry, buffer,
//! drop-and-count), not fatal conditions. Logging must never crash the host
//! application.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DltError>;

/// Errors and flow-control statuses of the DLT client.
#[derive(Debug)]
pub enum DltError {
    /// Logging is disabled or the state has been shut down.
    LoggingDisabled,
    /// The per-message scratch buffer would exceed its configured length.
    UserBufferFull,
    /// The startup ring buffer cannot accept the entry (static mode full,
    /// or dynamic growth capped at max size).
    BufferFull,
    /// The daemon pipe/socket is full (would block); message dropped.
    PipeFull,
    /// The daemon pipe/socket is broken; message dropped.
    PipeError,
    /// An argument failed validation (bad id, zero size, stale handle, ...).
    WrongParameter(&'static str),
    /// Not enough bytes buffered to satisfy the request.
    NotEnoughData,
    /// The decoder lost frame sync and skipped bytes searching for the next
    /// storage pattern.
    Resync { skipped: usize },
    /// Underlying I/O failure.
    Io(io::Error),
}

impl fmt::Display for DltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggingDisabled => write!(f, "logging is disabled"),
            Self::UserBufferFull => write!(f, "message buffer length exceeded"),
            Self::BufferFull => write!(f, "ring buffer full"),
            Self::PipeFull => write!(f, "daemon pipe full, message dropped"),
            Self::PipeError => write!(f, "daemon pipe broken, message dropped"),
            Self::WrongParameter(what) => write!(f, "wrong parameter: {what}"),
            Self::NotEnoughData => write!(f, "not enough data buffered"),
            Self::Resync { skipped } => {
                write!(f, "lost frame sync, skipped {skipped} bytes")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for DltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DltError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
