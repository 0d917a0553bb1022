// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DLT protocol constants - single source of truth for the wire format.
//!
//! Bit layouts follow the AUTOSAR/GENIVI DLT protocol. **Never hardcode
//! these values elsewhere!**

/// Size of every DLT identifier (ECU, session-less app id, context id).
pub const ID_SIZE: usize = 4;

/// Storage header pattern: `"DLT"` + 0x01.
pub const STORAGE_PATTERN: [u8; 4] = *b"DLT\x01";

/// Serialized storage header size (pattern + seconds + microseconds + ecu).
pub const STORAGE_HEADER_SIZE: usize = 16;

/// Serialized standard header size (htyp + mcnt + len).
pub const STANDARD_HEADER_SIZE: usize = 4;

/// Serialized extended header size (msin + noar + apid + ctid).
pub const EXTENDED_HEADER_SIZE: usize = 10;

/// Largest possible header extra (ecu + session id + timestamp).
pub const HEADER_EXTRA_MAX_SIZE: usize = ID_SIZE + 4 + 4;

/// Maximum payload bytes of a single message, sized for typical transport
/// MTU headroom. Longer strings/raw blocks are split across messages.
pub const USER_BUF_MAX_SIZE: usize = 1390;

/// Upper bound for one message on the wire (headers + payload budget).
pub const MAX_WIRE_SIZE: usize =
    STANDARD_HEADER_SIZE + HEADER_EXTRA_MAX_SIZE + EXTENDED_HEADER_SIZE + USER_BUF_MAX_SIZE;

// -----------------------------------------------------------------------
// Standard header type byte (htyp) bit flags
// -----------------------------------------------------------------------

/// Use extended header.
pub const HTYP_UEH: u8 = 0x01;
/// Payload and header extra are big-endian (most significant byte first).
pub const HTYP_MSBF: u8 = 0x02;
/// Header extra carries the ECU id.
pub const HTYP_WEID: u8 = 0x04;
/// Header extra carries the session id.
pub const HTYP_WSID: u8 = 0x08;
/// Header extra carries the timestamp.
pub const HTYP_WTMS: u8 = 0x10;
/// Protocol version 1 in bits 5-7.
pub const HTYP_PROTOCOL_VERSION1: u8 = 0x20;
/// Mask covering the version bits.
pub const HTYP_VERSION_MASK: u8 = 0xE0;

// -----------------------------------------------------------------------
// Extended header message info byte (msin)
// -----------------------------------------------------------------------

/// Verbose payload encoding.
pub const MSIN_VERB: u8 = 0x01;
/// Message type (MSTP) mask/shift within msin.
pub const MSIN_MSTP_MASK: u8 = 0x0E;
pub const MSIN_MSTP_SHIFT: u8 = 1;
/// Message type info (MTIN, e.g. log level) mask/shift within msin.
pub const MSIN_MTIN_MASK: u8 = 0xF0;
pub const MSIN_MTIN_SHIFT: u8 = 4;

/// Message types (MSTP values).
pub const TYPE_LOG: u8 = 0x00;
pub const TYPE_APP_TRACE: u8 = 0x01;
pub const TYPE_NW_TRACE: u8 = 0x02;
pub const TYPE_CONTROL: u8 = 0x03;

/// Network trace subtypes (MTIN values for [`TYPE_NW_TRACE`]).
pub const NW_TRACE_IPC: u8 = 0x01;
pub const NW_TRACE_CAN: u8 = 0x02;
pub const NW_TRACE_FLEXRAY: u8 = 0x03;
pub const NW_TRACE_MOST: u8 = 0x04;
pub const NW_TRACE_ETHERNET: u8 = 0x05;
pub const NW_TRACE_SOMEIP: u8 = 0x06;

// -----------------------------------------------------------------------
// Verbose payload type-info word
// -----------------------------------------------------------------------

/// Type length (TYLE) mask; values [`TYLE_8BIT`]..[`TYLE_128BIT`].
pub const TYPE_INFO_TYLE: u32 = 0x0000_000F;
pub const TYLE_8BIT: u32 = 0x0000_0001;
pub const TYLE_16BIT: u32 = 0x0000_0002;
pub const TYLE_32BIT: u32 = 0x0000_0003;
pub const TYLE_64BIT: u32 = 0x0000_0004;
pub const TYLE_128BIT: u32 = 0x0000_0005;

pub const TYPE_INFO_BOOL: u32 = 0x0000_0010;
pub const TYPE_INFO_SINT: u32 = 0x0000_0020;
pub const TYPE_INFO_UINT: u32 = 0x0000_0040;
pub const TYPE_INFO_FLOA: u32 = 0x0000_0080;
pub const TYPE_INFO_ARAY: u32 = 0x0000_0100;
pub const TYPE_INFO_STRG: u32 = 0x0000_0200;
pub const TYPE_INFO_RAWD: u32 = 0x0000_0400;
/// Variable info: name (and unit) strings precede the value.
pub const TYPE_INFO_VARI: u32 = 0x0000_0800;
pub const TYPE_INFO_FIXP: u32 = 0x0000_1000;
pub const TYPE_INFO_TRAI: u32 = 0x0000_2000;
pub const TYPE_INFO_STRU: u32 = 0x0000_4000;

/// String coding (SCOD) mask and values.
pub const TYPE_INFO_SCOD: u32 = 0x0003_8000;
pub const SCOD_ASCII: u32 = 0x0000_0000;
pub const SCOD_UTF8: u32 = 0x0000_8000;

// -----------------------------------------------------------------------
// Daemon-to-application control traffic (user header protocol)
// -----------------------------------------------------------------------

/// User header pattern: `"DUH"` + 0x01.
pub const USER_HEADER_PATTERN: [u8; 4] = *b"DUH\x01";

/// Serialized user header size (pattern + message type).
pub const USER_HEADER_SIZE: usize = 8;

/// Daemon changed the log level / trace status of a context.
pub const USER_MESSAGE_LOG_LEVEL: u32 = 6;
/// Daemon forwards an injection message to a registered callback.
pub const USER_MESSAGE_INJECTION: u32 = 7;
/// Daemon announces its connection state.
pub const USER_MESSAGE_LOG_STATE: u32 = 12;

/// Injection service ids start here; smaller ids are reserved for DLT
/// service messages.
pub const INJECTION_SERVICE_ID_MIN: u32 = 0xFFF;
