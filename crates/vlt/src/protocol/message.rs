// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Whole-message encode and streaming decode.
//!
//! Decoding works on a byte stream as delivered by [`crate::receiver`]:
//! zero or more complete frames plus at most one trailing partial frame.
//! A bad storage pattern triggers a forward scan for the next `"DLT\x01"`
//! occurrence instead of abandoning the stream. Known limitation carried
//! over from the protocol: the pattern can legitimately appear inside
//! binary payload bytes, so a resync after corruption may lock onto a false
//! position and drop one more frame before recovering.

use super::constants::*;
use super::header::{ExtendedHeader, HeaderExtra, StandardHeader, StorageHeader};
use crate::error::{DltError, Result};

/// One DLT message with all header sections.
///
/// `storage` is present for messages read from or destined for `.dlt`
/// files; daemon traffic carries none.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub storage: Option<StorageHeader>,
    pub standard: StandardHeader,
    pub extra: HeaderExtra,
    pub extended: Option<ExtendedHeader>,
    pub payload: Vec<u8>,
}

/// Result of one decode attempt on a byte stream.
#[derive(Debug, PartialEq)]
pub enum DecodeOutcome {
    /// A complete frame; `consumed` bytes can be removed from the stream.
    Frame { message: Message, consumed: usize },
    /// The stream ends mid-frame; append more bytes and retry.
    NeedMore,
    /// Sync was lost; drop `skipped` bytes and retry.
    Resync { skipped: usize },
}

impl Message {
    /// Wire length (standard header + extra + extended + payload), i.e. the
    /// value of the standard header `len` field.
    pub fn wire_len(&self) -> usize {
        STANDARD_HEADER_SIZE
            + self.extra.size()
            + self.extended.map_or(0, |_| EXTENDED_HEADER_SIZE)
            + self.payload.len()
    }

    /// Encode without the storage header, as sent to the daemon.
    ///
    /// The standard header `len` is computed here, so encoded frames always
    /// satisfy the length-consistency invariant regardless of what the
    /// `standard.len` field holds.
    pub fn encode_wire(&self) -> Result<Vec<u8>> {
        let wire_len = self.wire_len();
        if wire_len > MAX_WIRE_SIZE {
            return Err(DltError::UserBufferFull);
        }
        let msbf = self.standard.is_msbf();
        let mut buf = Vec::with_capacity(wire_len);
        let standard = StandardHeader {
            len: wire_len as u16,
            ..self.standard
        };
        standard.encode_into(&mut buf);
        self.extra.encode_into(&mut buf, msbf);
        if let Some(extended) = &self.extended {
            extended.encode_into(&mut buf);
        }
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Encode with a storage header, as written to `.dlt` files.
    pub fn encode_storage(&self) -> Result<Vec<u8>> {
        let storage = self
            .storage
            .ok_or(DltError::WrongParameter("message has no storage header"))?;
        let mut buf = Vec::with_capacity(STORAGE_HEADER_SIZE + self.wire_len());
        storage.encode_into(&mut buf);
        buf.extend_from_slice(&self.encode_wire()?);
        Ok(buf)
    }

    /// Decode one frame from a storage-format stream (`.dlt` file bytes).
    pub fn decode_storage(buf: &[u8]) -> DecodeOutcome {
        if buf.len() < STORAGE_PATTERN.len() {
            return DecodeOutcome::NeedMore;
        }
        if !StorageHeader::check_pattern(buf) {
            return resync(buf);
        }
        if buf.len() < STORAGE_HEADER_SIZE + STANDARD_HEADER_SIZE {
            return DecodeOutcome::NeedMore;
        }
        // Pattern checked above, header complete: decode cannot fail here.
        let storage = match StorageHeader::decode(buf) {
            Ok(s) => s,
            Err(_) => return resync(buf),
        };
        match Self::decode_wire(&buf[STORAGE_HEADER_SIZE..]) {
            DecodeOutcome::Frame { mut message, consumed } => {
                message.storage = Some(storage);
                DecodeOutcome::Frame {
                    message,
                    consumed: consumed + STORAGE_HEADER_SIZE,
                }
            }
            DecodeOutcome::NeedMore => DecodeOutcome::NeedMore,
            // The frame behind a valid pattern is inconsistent: skip the
            // pattern and rescan from the next byte.
            DecodeOutcome::Resync { .. } => DecodeOutcome::Resync {
                skipped: STORAGE_PATTERN.len(),
            },
        }
    }

    /// Decode one frame from a daemon-format stream (no storage header).
    pub fn decode_wire(buf: &[u8]) -> DecodeOutcome {
        let standard = match StandardHeader::decode(buf) {
            Ok(s) => s,
            Err(_) => return DecodeOutcome::NeedMore,
        };
        let declared = standard.len as usize;
        if declared < standard.header_size() || declared > MAX_WIRE_SIZE {
            return DecodeOutcome::Resync { skipped: 1 };
        }
        if buf.len() < declared {
            return DecodeOutcome::NeedMore;
        }

        let mut offset = STANDARD_HEADER_SIZE;
        let (extra, extra_len) = match HeaderExtra::decode(&buf[offset..], &standard) {
            Ok(v) => v,
            Err(_) => return DecodeOutcome::NeedMore,
        };
        offset += extra_len;

        let extended = if standard.has_extended() {
            match ExtendedHeader::decode(&buf[offset..]) {
                Ok(e) => {
                    offset += EXTENDED_HEADER_SIZE;
                    Some(e)
                }
                Err(_) => return DecodeOutcome::NeedMore,
            }
        } else {
            None
        };

        let payload = buf[offset..declared].to_vec();
        DecodeOutcome::Frame {
            message: Message {
                storage: None,
                standard,
                extra,
                extended,
                payload,
            },
            consumed: declared,
        }
    }
}

// Scan forward for the next storage pattern. The last three bytes are kept
// in case the pattern is split across reads.
fn resync(buf: &[u8]) -> DecodeOutcome {
    for start in 1..buf.len() {
        let window = &buf[start..];
        let check = window.len().min(STORAGE_PATTERN.len());
        if window[..check] == STORAGE_PATTERN[..check] {
            return DecodeOutcome::Resync { skipped: start };
        }
    }
    DecodeOutcome::Resync {
        skipped: buf.len().saturating_sub(STORAGE_PATTERN.len() - 1).max(1),
    }
}
