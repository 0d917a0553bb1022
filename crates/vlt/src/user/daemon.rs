// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon-to-application control traffic.
//!
//! The daemon talks back to applications over a side channel using its own
//! framing: an 8-byte user header (`"DUH\x01"` + message type) followed by a
//! fixed body per type. Only the subset an application consumes is modeled:
//! log-level changes, injection messages and the daemon's log state.
//!
//! Body fields are little-endian: this channel never crosses a machine
//! boundary, so no MSBF negotiation applies.

use crate::protocol::constants::{USER_HEADER_PATTERN, USER_HEADER_SIZE};

/// User header in front of every daemon control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserMessageHeader {
    pub message_type: u32,
}

impl UserMessageHeader {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&USER_HEADER_PATTERN);
        buf.extend_from_slice(&self.message_type.to_le_bytes());
    }

    /// Decode from the first [`USER_HEADER_SIZE`] bytes; `None` when the
    /// pattern does not match (stream needs resync).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < USER_HEADER_SIZE || buf[..4] != USER_HEADER_PATTERN {
            return None;
        }
        Some(Self {
            message_type: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Body of a log-level-changed notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelChangedBody {
    /// Registration position of the context (the arena slot index).
    pub log_level_pos: i32,
    pub log_level: i8,
    pub trace_status: i8,
}

impl LogLevelChangedBody {
    pub const SIZE: usize = 6;

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.log_level_pos.to_le_bytes());
        buf.push(self.log_level as u8);
        buf.push(self.trace_status as u8);
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            log_level_pos: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            log_level: buf[4] as i8,
            trace_status: buf[5] as i8,
        })
    }
}

/// Fixed part of an injection message; `data_length` payload bytes follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InjectionBody {
    pub log_level_pos: i32,
    pub service_id: u32,
    pub data_length: u32,
}

impl InjectionBody {
    pub const SIZE: usize = 12;

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.log_level_pos.to_le_bytes());
        buf.extend_from_slice(&self.service_id.to_le_bytes());
        buf.extend_from_slice(&self.data_length.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            log_level_pos: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            service_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_length: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}
