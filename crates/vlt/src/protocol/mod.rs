// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DLT wire format (bit-exact)
//!
//! Every DLT message on the wire is a sequence of header sections followed by
//! the payload. Which sections are present is encoded in the standard header
//! type byte (`htyp`):
//!
//! ```text
//! +----------------+-----------------+--------------+-----------------+---------+
//! | storage header | standard header | header extra | extended header | payload |
//! |  16 B (files)  |      4 B        |  0..12 B     |  0 or 10 B      |  0..n B |
//! +----------------+-----------------+--------------+-----------------+---------+
//!                   ^ htyp, mcnt, len (len excludes the storage header)
//! ```
//!
//! The storage header only exists in `.dlt` files and tool output; daemon
//! traffic starts at the standard header. Multi-byte fields in the header
//! extra and the payload follow the byte order announced by the `MSBF` bit
//! in `htyp`; the standard header length is always big-endian; the storage
//! header is always little-endian. Encode and decode use the same
//! conversion, so a round trip is byte-identical for either byte order.

pub mod argument;
pub mod constants;
pub mod header;
pub mod message;

pub use argument::{Argument, ArgumentValue, Attributes};
pub use header::{ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader};
pub use message::{DecodeOutcome, Message};

use crate::error::DltError;
use constants::ID_SIZE;
use std::fmt;

/// A 4-byte DLT identifier (ECU id, application id, context id).
///
/// Shorter ids are right-padded with NUL bytes; longer input is truncated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DltId(pub [u8; ID_SIZE]);

impl DltId {
    /// Build an id from a string, padding or truncating to 4 bytes.
    pub fn new(s: &str) -> Self {
        let mut id = [0u8; ID_SIZE];
        for (dst, src) in id.iter_mut().zip(s.bytes()) {
            *dst = src;
        }
        Self(id)
    }

    /// True if all four bytes are NUL (the wildcard/empty id).
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ID_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for DltId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b == 0 {
                break;
            }
            // Non-printable bytes render as '-' so tool output stays aligned.
            write!(f, "{}", if b.is_ascii_graphic() { b as char } else { '-' })?;
        }
        Ok(())
    }
}

impl fmt::Debug for DltId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DltId(\"{self}\")")
    }
}

impl From<&str> for DltId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// DLT log levels, most severe first.
///
/// `Default` defers to the daemon-configured default; it is never put on the
/// wire as a message level.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(i8)]
pub enum LogLevel {
    Default = -1,
    Off = 0,
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Verbose = 6,
}

impl LogLevel {
    /// Decode a raw level byte; out-of-range values are rejected.
    pub fn from_raw(raw: i8) -> Result<Self, DltError> {
        Ok(match raw {
            -1 => Self::Default,
            0 => Self::Off,
            1 => Self::Fatal,
            2 => Self::Error,
            3 => Self::Warn,
            4 => Self::Info,
            5 => Self::Debug,
            6 => Self::Verbose,
            _ => return Err(DltError::WrongParameter("log level out of range")),
        })
    }

    pub fn as_raw(self) -> i8 {
        self as i8
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Off => "off",
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        };
        f.write_str(s)
    }
}

/// Trace status of a context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(i8)]
pub enum TraceStatus {
    Default = -1,
    Off = 0,
    On = 1,
}

impl TraceStatus {
    pub fn from_raw(raw: i8) -> Result<Self, DltError> {
        Ok(match raw {
            -1 => Self::Default,
            0 => Self::Off,
            1 => Self::On,
            _ => return Err(DltError::WrongParameter("trace status out of range")),
        })
    }

    pub fn as_raw(self) -> i8 {
        self as i8
    }
}

// Byte-order helpers. `msbf` mirrors the HTYP_MSBF bit: set means the
// producer wrote multi-byte fields big-endian.

#[inline]
pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16, msbf: bool) {
    let bytes = if msbf {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    buf.extend_from_slice(&bytes);
}

#[inline]
pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32, msbf: bool) {
    let bytes = if msbf {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    buf.extend_from_slice(&bytes);
}

#[inline]
pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64, msbf: bool) {
    let bytes = if msbf {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    };
    buf.extend_from_slice(&bytes);
}

#[inline]
pub(crate) fn get_u16(buf: &[u8], msbf: bool) -> u16 {
    let raw = [buf[0], buf[1]];
    if msbf {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    }
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], msbf: bool) -> u32 {
    let raw = [buf[0], buf[1], buf[2], buf[3]];
    if msbf {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], msbf: bool) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[..8]);
    if msbf {
        u64::from_be_bytes(raw)
    } else {
        u64::from_le_bytes(raw)
    }
}

/// True when the host byte order matches the MSBF (big-endian) flag.
#[inline]
pub(crate) fn host_is_msbf() -> bool {
    cfg!(target_endian = "big")
}
