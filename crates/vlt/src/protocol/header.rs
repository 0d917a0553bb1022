// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Header sections of a DLT message.
//!
//! Each section owns its exact byte layout: explicit `encode_into` /
//! `decode` pairs, no reliance on struct packing. The standard header length
//! field is always big-endian; header extra fields follow the `MSBF` flag of
//! the standard header.

use super::constants::*;
use super::{get_u32, put_u32, DltId};
use crate::error::{DltError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage header: prepended to every message in `.dlt` files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageHeader {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Sub-second part in microseconds.
    pub microseconds: i32,
    /// ECU id of the recording node.
    pub ecu: DltId,
}

impl StorageHeader {
    /// Stamp a storage header with the current wall-clock time.
    pub fn now(ecu: DltId) -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: elapsed.as_secs() as u32,
            microseconds: elapsed.subsec_micros() as i32,
            ecu,
        }
    }

    /// True if `buf` starts with the `"DLT\x01"` pattern.
    pub fn check_pattern(buf: &[u8]) -> bool {
        buf.len() >= STORAGE_PATTERN.len() && buf[..STORAGE_PATTERN.len()] == STORAGE_PATTERN
    }

    /// Append the 16-byte storage header. Numeric fields are always
    /// little-endian, independent of the message byte order.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&STORAGE_PATTERN);
        buf.extend_from_slice(&self.seconds.to_le_bytes());
        buf.extend_from_slice(&self.microseconds.to_le_bytes());
        buf.extend_from_slice(self.ecu.as_bytes());
    }

    /// Decode a storage header; the pattern must already be verified or the
    /// caller gets a wrong-parameter error.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < STORAGE_HEADER_SIZE {
            return Err(DltError::NotEnoughData);
        }
        if !Self::check_pattern(buf) {
            return Err(DltError::WrongParameter("storage header pattern"));
        }
        let mut ecu = [0u8; ID_SIZE];
        ecu.copy_from_slice(&buf[12..16]);
        Ok(Self {
            seconds: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            microseconds: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            ecu: DltId(ecu),
        })
    }
}

/// Standard header: present in every DLT message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardHeader {
    /// Header type byte; see the `HTYP_*` flags.
    pub htyp: u8,
    /// Message counter, wrapping per context.
    pub mcnt: u8,
    /// Total message length excluding the storage header.
    pub len: u16,
}

impl StandardHeader {
    /// Build an htyp byte from the section flags, always version 1.
    pub fn make_htyp(
        use_extended: bool,
        msbf: bool,
        with_ecu: bool,
        with_session: bool,
        with_timestamp: bool,
    ) -> u8 {
        let mut htyp = HTYP_PROTOCOL_VERSION1;
        if use_extended {
            htyp |= HTYP_UEH;
        }
        if msbf {
            htyp |= HTYP_MSBF;
        }
        if with_ecu {
            htyp |= HTYP_WEID;
        }
        if with_session {
            htyp |= HTYP_WSID;
        }
        if with_timestamp {
            htyp |= HTYP_WTMS;
        }
        htyp
    }

    #[inline]
    pub fn has_extended(&self) -> bool {
        self.htyp & HTYP_UEH != 0
    }

    #[inline]
    pub fn is_msbf(&self) -> bool {
        self.htyp & HTYP_MSBF != 0
    }

    #[inline]
    pub fn with_ecu(&self) -> bool {
        self.htyp & HTYP_WEID != 0
    }

    #[inline]
    pub fn with_session(&self) -> bool {
        self.htyp & HTYP_WSID != 0
    }

    #[inline]
    pub fn with_timestamp(&self) -> bool {
        self.htyp & HTYP_WTMS != 0
    }

    /// Size of the header extra section this htyp announces.
    pub fn extra_size(&self) -> usize {
        (if self.with_ecu() { ID_SIZE } else { 0 })
            + (if self.with_session() { 4 } else { 0 })
            + (if self.with_timestamp() { 4 } else { 0 })
    }

    /// Total header size (standard + extra + extended) this htyp announces,
    /// excluding the storage header.
    pub fn header_size(&self) -> usize {
        STANDARD_HEADER_SIZE
            + self.extra_size()
            + if self.has_extended() {
                EXTENDED_HEADER_SIZE
            } else {
                0
            }
    }

    /// Append the 4-byte standard header. `len` is always big-endian.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.htyp);
        buf.push(self.mcnt);
        buf.extend_from_slice(&self.len.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < STANDARD_HEADER_SIZE {
            return Err(DltError::NotEnoughData);
        }
        Ok(Self {
            htyp: buf[0],
            mcnt: buf[1],
            len: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }
}

/// Header extra: optional ECU id, session id and timestamp, each gated by an
/// htyp flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderExtra {
    pub ecu: Option<DltId>,
    pub session_id: Option<u32>,
    /// Time since system start in 0.1 ms units.
    pub timestamp: Option<u32>,
}

impl HeaderExtra {
    pub fn size(&self) -> usize {
        (if self.ecu.is_some() { ID_SIZE } else { 0 })
            + (if self.session_id.is_some() { 4 } else { 0 })
            + (if self.timestamp.is_some() { 4 } else { 0 })
    }

    /// Append the sections that are present, honoring `msbf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>, msbf: bool) {
        if let Some(ecu) = self.ecu {
            buf.extend_from_slice(ecu.as_bytes());
        }
        if let Some(session_id) = self.session_id {
            put_u32(buf, session_id, msbf);
        }
        if let Some(timestamp) = self.timestamp {
            put_u32(buf, timestamp, msbf);
        }
    }

    /// Decode the sections announced by `standard`, returning the extra and
    /// the number of bytes consumed.
    pub fn decode(buf: &[u8], standard: &StandardHeader) -> Result<(Self, usize)> {
        if buf.len() < standard.extra_size() {
            return Err(DltError::NotEnoughData);
        }
        let msbf = standard.is_msbf();
        let mut offset = 0;
        let mut extra = Self::default();
        if standard.with_ecu() {
            let mut ecu = [0u8; ID_SIZE];
            ecu.copy_from_slice(&buf[offset..offset + ID_SIZE]);
            extra.ecu = Some(DltId(ecu));
            offset += ID_SIZE;
        }
        if standard.with_session() {
            extra.session_id = Some(get_u32(&buf[offset..], msbf));
            offset += 4;
        }
        if standard.with_timestamp() {
            extra.timestamp = Some(get_u32(&buf[offset..], msbf));
            offset += 4;
        }
        Ok((extra, offset))
    }
}

/// Extended header: message classification plus application/context ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedHeader {
    /// Message info byte; see the `MSIN_*` masks.
    pub msin: u8,
    /// Number of verbose arguments (0 in non-verbose mode).
    pub noar: u8,
    pub apid: DltId,
    pub ctid: DltId,
}

impl ExtendedHeader {
    /// Build the message info byte from type, subtype and verbose flag.
    pub fn make_msin(mstp: u8, mtin: u8, verbose: bool) -> u8 {
        let mut msin = ((mstp << MSIN_MSTP_SHIFT) & MSIN_MSTP_MASK)
            | ((mtin << MSIN_MTIN_SHIFT) & MSIN_MTIN_MASK);
        if verbose {
            msin |= MSIN_VERB;
        }
        msin
    }

    #[inline]
    pub fn is_verbose(&self) -> bool {
        self.msin & MSIN_VERB != 0
    }

    /// Message type (MSTP): log, app trace, network trace or control.
    #[inline]
    pub fn message_type(&self) -> u8 {
        (self.msin & MSIN_MSTP_MASK) >> MSIN_MSTP_SHIFT
    }

    /// Message type info (MTIN): the log level for log messages.
    #[inline]
    pub fn message_type_info(&self) -> u8 {
        (self.msin & MSIN_MTIN_MASK) >> MSIN_MTIN_SHIFT
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.msin);
        buf.push(self.noar);
        buf.extend_from_slice(self.apid.as_bytes());
        buf.extend_from_slice(self.ctid.as_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < EXTENDED_HEADER_SIZE {
            return Err(DltError::NotEnoughData);
        }
        let mut apid = [0u8; ID_SIZE];
        let mut ctid = [0u8; ID_SIZE];
        apid.copy_from_slice(&buf[2..6]);
        ctid.copy_from_slice(&buf[6..10]);
        Ok(Self {
            msin: buf[0],
            noar: buf[1],
            apid: DltId(apid),
            ctid: DltId(ctid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_header_round_trip() {
        let hdr = StorageHeader {
            seconds: 1_700_000_000,
            microseconds: 123_456,
            ecu: DltId::new("ECU1"),
        };
        let mut buf = Vec::new();
        hdr.encode_into(&mut buf);
        assert_eq!(buf.len(), STORAGE_HEADER_SIZE);
        assert!(StorageHeader::check_pattern(&buf));
        assert_eq!(StorageHeader::decode(&buf).unwrap(), hdr);
    }

    #[test]
    fn storage_header_rejects_bad_pattern() {
        let mut buf = vec![0u8; STORAGE_HEADER_SIZE];
        buf[..4].copy_from_slice(b"XLT\x01");
        assert!(matches!(
            StorageHeader::decode(&buf),
            Err(DltError::WrongParameter(_))
        ));
    }

    #[test]
    fn htyp_flags_predict_sections() {
        let htyp = StandardHeader::make_htyp(true, false, true, false, true);
        let hdr = StandardHeader {
            htyp,
            mcnt: 0,
            len: 0,
        };
        assert!(hdr.has_extended());
        assert!(!hdr.is_msbf());
        assert!(hdr.with_ecu());
        assert!(!hdr.with_session());
        assert!(hdr.with_timestamp());
        assert_eq!(hdr.extra_size(), ID_SIZE + 4);
        assert_eq!(
            hdr.header_size(),
            STANDARD_HEADER_SIZE + ID_SIZE + 4 + EXTENDED_HEADER_SIZE
        );
        assert_eq!(htyp & HTYP_VERSION_MASK, HTYP_PROTOCOL_VERSION1);
    }

    #[test]
    fn standard_header_len_is_big_endian() {
        let hdr = StandardHeader {
            htyp: HTYP_PROTOCOL_VERSION1,
            mcnt: 7,
            len: 0x0102,
        };
        let mut buf = Vec::new();
        hdr.encode_into(&mut buf);
        assert_eq!(buf, [HTYP_PROTOCOL_VERSION1, 7, 0x01, 0x02]);
        assert_eq!(StandardHeader::decode(&buf).unwrap(), hdr);
    }

    #[test]
    fn header_extra_round_trip_both_orders() {
        for msbf in [false, true] {
            let standard = StandardHeader {
                htyp: StandardHeader::make_htyp(false, msbf, true, true, true),
                mcnt: 0,
                len: 0,
            };
            let extra = HeaderExtra {
                ecu: Some(DltId::new("ECU1")),
                session_id: Some(0x1122_3344),
                timestamp: Some(0x5566_7788),
            };
            let mut buf = Vec::new();
            extra.encode_into(&mut buf, msbf);
            assert_eq!(buf.len(), extra.size());
            let (decoded, consumed) = HeaderExtra::decode(&buf, &standard).unwrap();
            assert_eq!(decoded, extra);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn extended_header_msin_fields() {
        let msin = ExtendedHeader::make_msin(TYPE_LOG, 4, true);
        let ext = ExtendedHeader {
            msin,
            noar: 2,
            apid: DltId::new("APP1"),
            ctid: DltId::new("CTX1"),
        };
        assert!(ext.is_verbose());
        assert_eq!(ext.message_type(), TYPE_LOG);
        assert_eq!(ext.message_type_info(), 4);

        let mut buf = Vec::new();
        ext.encode_into(&mut buf);
        assert_eq!(ExtendedHeader::decode(&buf).unwrap(), ext);
    }
}
