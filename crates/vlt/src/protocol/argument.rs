// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Verbose-mode argument encoding.
//!
//! Each verbose argument is a 4-byte type-info word followed by a
//! type-specific payload:
//!
//! ```text
//! scalar:          [type info][           value            ]
//! scalar + VARI:   [type info][name len][unit len][name][unit][value]
//! string:          [type info][str len][        bytes + NUL  ]
//! string + VARI:   [type info][str len][name len][name][bytes + NUL]
//! raw:             [type info][len][            bytes        ]
//! ```
//!
//! String lengths include the NUL terminator; a zero name/unit length means
//! "absent". Non-verbose payloads skip all of this and start with a 4-byte
//! message id.

use super::constants::*;
use super::{get_u16, get_u32, get_u64, put_u16, put_u32};
use crate::error::{DltError, Result};

/// Optional name/unit attributes of an argument ("attributed" writers).
#[derive(Clone, Copy, Debug, Default)]
pub struct Attributes<'a> {
    pub name: Option<&'a str>,
    pub unit: Option<&'a str>,
}

impl<'a> Attributes<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name: Some(name),
            unit: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.unit.is_none()
    }
}

/// A decoded verbose argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub value: ArgumentValue,
    pub name: Option<String>,
    pub unit: Option<String>,
}

/// The value part of a decoded argument. Integer widths are folded into
/// i64/u64; the original width stays visible through the type-info word the
/// decoder consumed.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentValue {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Raw(Vec<u8>),
}

impl std::fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Raw(v) => {
                for b in v {
                    write!(f, "{b:02x} ")?;
                }
                Ok(())
            }
        }
    }
}

// Name/unit block for scalar arguments: two u16 lengths, then the strings
// themselves (NUL-terminated). Zero length = absent.
fn put_scalar_attrs(buf: &mut Vec<u8>, attrs: &Attributes<'_>, msbf: bool) {
    let name_len = attrs.name.map_or(0, |n| n.len() + 1);
    let unit_len = attrs.unit.map_or(0, |u| u.len() + 1);
    put_u16(buf, name_len as u16, msbf);
    put_u16(buf, unit_len as u16, msbf);
    if let Some(name) = attrs.name {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    if let Some(unit) = attrs.unit {
        buf.extend_from_slice(unit.as_bytes());
        buf.push(0);
    }
}

fn write_scalar(
    buf: &mut Vec<u8>,
    type_info: u32,
    value: &[u8; 8],
    width: usize,
    msbf: bool,
    attrs: &Attributes<'_>,
) {
    let type_info = if attrs.is_empty() {
        type_info
    } else {
        type_info | TYPE_INFO_VARI
    };
    put_u32(buf, type_info, msbf);
    if type_info & TYPE_INFO_VARI != 0 {
        put_scalar_attrs(buf, attrs, msbf);
    }
    // `value` holds the little-endian representation; reverse for MSBF.
    if msbf {
        buf.extend(value[..width].iter().rev());
    } else {
        buf.extend_from_slice(&value[..width]);
    }
}

pub fn write_bool(buf: &mut Vec<u8>, value: bool, msbf: bool, attrs: &Attributes<'_>) {
    // BOOL carries a name but never a unit.
    let attrs = Attributes {
        name: attrs.name,
        unit: None,
    };
    write_scalar(
        buf,
        TYPE_INFO_BOOL | TYLE_8BIT,
        &[u8::from(value), 0, 0, 0, 0, 0, 0, 0],
        1,
        msbf,
        &attrs,
    );
}

macro_rules! int_writer {
    ($name:ident, $ty:ty, $base:expr, $tyle:expr, $width:expr) => {
        pub fn $name(buf: &mut Vec<u8>, value: $ty, msbf: bool, attrs: &Attributes<'_>) {
            let mut le = [0u8; 8];
            le[..$width].copy_from_slice(&value.to_le_bytes());
            write_scalar(buf, $base | $tyle, &le, $width, msbf, attrs);
        }
    };
}

int_writer!(write_i8, i8, TYPE_INFO_SINT, TYLE_8BIT, 1);
int_writer!(write_i16, i16, TYPE_INFO_SINT, TYLE_16BIT, 2);
int_writer!(write_i32, i32, TYPE_INFO_SINT, TYLE_32BIT, 4);
int_writer!(write_i64, i64, TYPE_INFO_SINT, TYLE_64BIT, 8);
int_writer!(write_u8, u8, TYPE_INFO_UINT, TYLE_8BIT, 1);
int_writer!(write_u16, u16, TYPE_INFO_UINT, TYLE_16BIT, 2);
int_writer!(write_u32, u32, TYPE_INFO_UINT, TYLE_32BIT, 4);
int_writer!(write_u64, u64, TYPE_INFO_UINT, TYLE_64BIT, 8);

pub fn write_f32(buf: &mut Vec<u8>, value: f32, msbf: bool, attrs: &Attributes<'_>) {
    let mut le = [0u8; 8];
    le[..4].copy_from_slice(&value.to_le_bytes());
    write_scalar(buf, TYPE_INFO_FLOA | TYLE_32BIT, &le, 4, msbf, attrs);
}

pub fn write_f64(buf: &mut Vec<u8>, value: f64, msbf: bool, attrs: &Attributes<'_>) {
    let le = value.to_le_bytes();
    write_scalar(buf, TYPE_INFO_FLOA | TYLE_64BIT, &le, 8, msbf, attrs);
}

/// Write a UTF-8 string argument. The length prefix covers the bytes plus
/// the NUL terminator; only a name attribute applies.
pub fn write_str(buf: &mut Vec<u8>, value: &str, msbf: bool, attrs: &Attributes<'_>) {
    let mut type_info = TYPE_INFO_STRG | SCOD_UTF8;
    if attrs.name.is_some() {
        type_info |= TYPE_INFO_VARI;
    }
    put_u32(buf, type_info, msbf);
    put_u16(buf, (value.len() + 1) as u16, msbf);
    if let Some(name) = attrs.name {
        put_u16(buf, (name.len() + 1) as u16, msbf);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

/// Write a raw-data argument (length-prefixed, no terminator).
pub fn write_raw(buf: &mut Vec<u8>, value: &[u8], msbf: bool, attrs: &Attributes<'_>) {
    let mut type_info = TYPE_INFO_RAWD;
    if attrs.name.is_some() {
        type_info |= TYPE_INFO_VARI;
    }
    put_u32(buf, type_info, msbf);
    put_u16(buf, value.len() as u16, msbf);
    if let Some(name) = attrs.name {
        put_u16(buf, (name.len() + 1) as u16, msbf);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    buf.extend_from_slice(value);
}

/// Byte size the encoder will emit for this string argument. Used by the
/// builder to enforce the message budget before encoding.
pub fn str_arg_size(value: &str, attrs: &Attributes<'_>) -> usize {
    4 + 2 + value.len() + 1 + attrs.name.map_or(0, |n| 2 + n.len() + 1)
}

/// Byte size the encoder will emit for this raw argument.
pub fn raw_arg_size(value: &[u8], attrs: &Attributes<'_>) -> usize {
    4 + 2 + value.len() + attrs.name.map_or(0, |n| 2 + n.len() + 1)
}

fn take(buf: &[u8], offset: &mut usize, n: usize) -> Result<()> {
    if buf.len() < *offset + n {
        return Err(DltError::NotEnoughData);
    }
    *offset += n;
    Ok(())
}

// Reads a NUL-terminated, length-prefixed string; the length was read by the
// caller. A zero length means absent.
fn read_prefixed_string(buf: &[u8], offset: &mut usize, len: usize) -> Result<Option<String>> {
    if len == 0 {
        return Ok(None);
    }
    let start = *offset;
    take(buf, offset, len)?;
    let bytes = &buf[start..start + len - 1];
    Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
}

fn scalar_width(type_info: u32) -> Result<usize> {
    match type_info & TYPE_INFO_TYLE {
        TYLE_8BIT => Ok(1),
        TYLE_16BIT => Ok(2),
        TYLE_32BIT => Ok(4),
        TYLE_64BIT => Ok(8),
        _ => Err(DltError::WrongParameter("unsupported type length")),
    }
}

/// Decode one verbose argument, returning it and the bytes consumed.
pub fn read_argument(buf: &[u8], msbf: bool) -> Result<(Argument, usize)> {
    let mut offset = 0;
    take(buf, &mut offset, 4)?;
    let type_info = get_u32(buf, msbf);
    let vari = type_info & TYPE_INFO_VARI != 0;

    let mut name = None;
    let mut unit = None;

    if type_info & TYPE_INFO_STRG != 0 || type_info & TYPE_INFO_RAWD != 0 {
        let is_string = type_info & TYPE_INFO_STRG != 0;
        take(buf, &mut offset, 2)?;
        let data_len = get_u16(&buf[offset - 2..], msbf) as usize;
        if vari {
            take(buf, &mut offset, 2)?;
            let name_len = get_u16(&buf[offset - 2..], msbf) as usize;
            name = read_prefixed_string(buf, &mut offset, name_len)?;
        }
        let start = offset;
        take(buf, &mut offset, data_len)?;
        let value = if is_string {
            // Strip the NUL terminator the length prefix covers.
            let end = if data_len > 0 { data_len - 1 } else { 0 };
            ArgumentValue::String(String::from_utf8_lossy(&buf[start..start + end]).into_owned())
        } else {
            ArgumentValue::Raw(buf[start..start + data_len].to_vec())
        };
        return Ok((Argument { value, name, unit }, offset));
    }

    // Scalar types carry the name/unit block before the value.
    if vari {
        take(buf, &mut offset, 4)?;
        let name_len = get_u16(&buf[offset - 4..], msbf) as usize;
        let unit_len = get_u16(&buf[offset - 2..], msbf) as usize;
        name = read_prefixed_string(buf, &mut offset, name_len)?;
        unit = read_prefixed_string(buf, &mut offset, unit_len)?;
    }

    let width = scalar_width(type_info)?;
    let start = offset;
    take(buf, &mut offset, width)?;
    let raw = &buf[start..start + width];

    let value = if type_info & TYPE_INFO_BOOL != 0 {
        ArgumentValue::Bool(raw[0] != 0)
    } else if type_info & TYPE_INFO_FLOA != 0 {
        match width {
            4 => {
                let bits = get_u32(raw, msbf);
                ArgumentValue::Float32(f32::from_bits(bits))
            }
            8 => {
                let bits = get_u64(raw, msbf);
                ArgumentValue::Float64(f64::from_bits(bits))
            }
            _ => return Err(DltError::WrongParameter("unsupported float width")),
        }
    } else if type_info & TYPE_INFO_SINT != 0 {
        let v = match width {
            1 => raw[0] as i8 as i64,
            2 => get_u16(raw, msbf) as i16 as i64,
            4 => get_u32(raw, msbf) as i32 as i64,
            8 => get_u64(raw, msbf) as i64,
            _ => unreachable!(),
        };
        ArgumentValue::Signed(v)
    } else if type_info & TYPE_INFO_UINT != 0 {
        let v = match width {
            1 => u64::from(raw[0]),
            2 => u64::from(get_u16(raw, msbf)),
            4 => u64::from(get_u32(raw, msbf)),
            8 => get_u64(raw, msbf),
            _ => unreachable!(),
        };
        ArgumentValue::Unsigned(v)
    } else {
        return Err(DltError::WrongParameter("unsupported type info"));
    };

    Ok((Argument { value, name, unit }, offset))
}

/// Decode all arguments of a verbose payload.
pub fn read_arguments(payload: &[u8], noar: u8, msbf: bool) -> Result<Vec<Argument>> {
    let mut args = Vec::with_capacity(noar as usize);
    let mut offset = 0;
    for _ in 0..noar {
        let (arg, consumed) = read_argument(&payload[offset..], msbf)?;
        args.push(arg);
        offset += consumed;
    }
    Ok(args)
}
