//! Purpose: Decode unsealed element buffers into typed scalar values.
//! Exports: `ColumnValue`, `PageValues`, `decode`, `element_codec`.
//! Role: Last stage of the column read path; consumes only plain little-endian layouts.
//! Invariants: Buffers handed to `decode` hold a whole number of elements.
//! Invariants: Split layouts never reach this module; the unsealer reassembles them.
use std::fmt;

use half::f16;

use crate::core::column_type::ColumnType;
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnValue {
    /// Row offset into a collection's item columns.
    Index(u64),
    UInt(u64),
    Int(i64),
    Real32(f32),
    Real64(f64),
    Byte(u8),
    /// Displayed as the Latin-1 character for the byte; column dumps write the byte itself.
    Char(u8),
    Bit(bool),
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Index(v) | ColumnValue::UInt(v) => write!(f, "{v}"),
            ColumnValue::Int(v) => write!(f, "{v}"),
            ColumnValue::Real32(v) => write!(f, "{v}"),
            ColumnValue::Real64(v) => write!(f, "{v}"),
            ColumnValue::Byte(v) => write!(f, "{v:08b}"),
            ColumnValue::Char(v) => write!(f, "{}", char::from(*v)),
            ColumnValue::Bit(v) => f.write_str(if *v { "1" } else { "0" }),
        }
    }
}

type DecodeFn = fn(&[u8]) -> ColumnValue;

#[derive(Clone, Copy)]
pub struct ElementCodec {
    pub element_size: usize,
    pub decode: Option<DecodeFn>,
}

const fn codec(element_size: usize, decode: DecodeFn) -> ElementCodec {
    ElementCodec {
        element_size,
        decode: Some(decode),
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn index64(b: &[u8]) -> ColumnValue {
    ColumnValue::Index(u64::from_le_bytes(le(b)))
}
fn index32(b: &[u8]) -> ColumnValue {
    ColumnValue::Index(u32::from_le_bytes(le(b)) as u64)
}
fn uint64(b: &[u8]) -> ColumnValue {
    ColumnValue::UInt(u64::from_le_bytes(le(b)))
}
fn uint32(b: &[u8]) -> ColumnValue {
    ColumnValue::UInt(u32::from_le_bytes(le(b)) as u64)
}
fn uint16(b: &[u8]) -> ColumnValue {
    ColumnValue::UInt(u16::from_le_bytes(le(b)) as u64)
}
fn uint8(b: &[u8]) -> ColumnValue {
    ColumnValue::UInt(b[0] as u64)
}
fn int64(b: &[u8]) -> ColumnValue {
    ColumnValue::Int(i64::from_le_bytes(le(b)))
}
fn int32(b: &[u8]) -> ColumnValue {
    ColumnValue::Int(i32::from_le_bytes(le(b)) as i64)
}
fn int16(b: &[u8]) -> ColumnValue {
    ColumnValue::Int(i16::from_le_bytes(le(b)) as i64)
}
fn int8(b: &[u8]) -> ColumnValue {
    ColumnValue::Int(b[0] as i8 as i64)
}
fn real64(b: &[u8]) -> ColumnValue {
    ColumnValue::Real64(f64::from_le_bytes(le(b)))
}
fn real32(b: &[u8]) -> ColumnValue {
    ColumnValue::Real32(f32::from_le_bytes(le(b)))
}
fn real16(b: &[u8]) -> ColumnValue {
    ColumnValue::Real32(f16::from_le_bytes(le(b)).to_f32())
}
fn byte(b: &[u8]) -> ColumnValue {
    ColumnValue::Byte(b[0])
}
fn character(b: &[u8]) -> ColumnValue {
    ColumnValue::Char(b[0])
}
fn bit(b: &[u8]) -> ColumnValue {
    ColumnValue::Bit(b[0] != 0)
}

/// Decode rule for one column type. Split variants share the rule of their plain twin.
pub const fn element_codec(column_type: ColumnType) -> ElementCodec {
    match column_type {
        ColumnType::Index64 | ColumnType::SplitIndex64 => codec(8, index64),
        ColumnType::Index32 | ColumnType::SplitIndex32 => codec(4, index32),
        ColumnType::UInt64 | ColumnType::SplitUInt64 => codec(8, uint64),
        ColumnType::UInt32 | ColumnType::SplitUInt32 => codec(4, uint32),
        ColumnType::UInt16 | ColumnType::SplitUInt16 => codec(2, uint16),
        ColumnType::UInt8 => codec(1, uint8),
        ColumnType::Int64 | ColumnType::SplitInt64 => codec(8, int64),
        ColumnType::Int32 | ColumnType::SplitInt32 => codec(4, int32),
        ColumnType::Int16 | ColumnType::SplitInt16 => codec(2, int16),
        ColumnType::Int8 => codec(1, int8),
        ColumnType::Real64 | ColumnType::SplitReal64 => codec(8, real64),
        ColumnType::Real32 | ColumnType::SplitReal32 => codec(4, real32),
        ColumnType::Real16 => codec(2, real16),
        ColumnType::Byte => codec(1, byte),
        ColumnType::Char => codec(1, character),
        ColumnType::Bit => codec(1, bit),
        ColumnType::Switch => ElementCodec {
            element_size: 12,
            decode: None,
        },
    }
}

pub fn unsupported_type(column_type: ColumnType) -> Error {
    Error::new(ErrorKind::UnsupportedType)
        .with_message(format!("cannot decode values of column type {column_type}"))
}

/// Values of one unsealed page; consumed once, front to back.
pub struct PageValues {
    raw: Vec<u8>,
    pos: usize,
    element_size: usize,
    decode: DecodeFn,
}

impl Iterator for PageValues {
    type Item = ColumnValue;

    fn next(&mut self) -> Option<ColumnValue> {
        let end = self.pos + self.element_size;
        let element = self.raw.get(self.pos..end)?;
        self.pos = end;
        Some((self.decode)(element))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.raw.len() - self.pos) / self.element_size;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PageValues {}

pub fn decode(raw: Vec<u8>, column_type: ColumnType) -> Result<PageValues, Error> {
    let ElementCodec {
        element_size,
        decode,
    } = element_codec(column_type);
    let decode = decode.ok_or_else(|| unsupported_type(column_type))?;
    if raw.len() % element_size != 0 {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "{} bytes is not a whole number of {column_type} elements",
            raw.len()
        )));
    }
    Ok(PageValues {
        raw,
        pos: 0,
        element_size,
        decode,
    })
}
