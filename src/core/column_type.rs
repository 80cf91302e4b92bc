// Closed set of on-disk column types and their element layouts.
use std::fmt;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ColumnType {
    Index64,
    Index32,
    Switch,
    Byte,
    Char,
    Bit,
    Real64,
    Real32,
    Real16,
    UInt64,
    UInt32,
    UInt16,
    UInt8,
    SplitIndex64,
    SplitIndex32,
    SplitReal64,
    SplitReal32,
    SplitUInt64,
    SplitUInt32,
    SplitUInt16,
    Int64,
    Int32,
    Int16,
    Int8,
    SplitInt64,
    SplitInt32,
    SplitInt16,
}

/// How elements are arranged inside a sealed page before decompression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Packing {
    /// Little-endian elements back to back.
    Plain,
    /// Byte plane `b` of every element is stored contiguously.
    Split,
    /// Split, then each element stores the difference to its predecessor.
    SplitDelta,
    /// Split, then each element is zigzag encoded.
    SplitZigzag,
    /// Eight elements per byte, least significant bit first.
    Bits,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ElementLayout {
    pub disk_code: u16,
    pub bits_on_storage: u16,
    /// Width of one element in an unsealed buffer.
    pub element_size: usize,
    pub packing: Packing,
    pub name: &'static str,
}

const fn layout(
    disk_code: u16,
    bits_on_storage: u16,
    element_size: usize,
    packing: Packing,
    name: &'static str,
) -> ElementLayout {
    ElementLayout {
        disk_code,
        bits_on_storage,
        element_size,
        packing,
        name,
    }
}

pub const ALL_COLUMN_TYPES: [ColumnType; 27] = [
    ColumnType::Index64,
    ColumnType::Index32,
    ColumnType::Switch,
    ColumnType::Byte,
    ColumnType::Char,
    ColumnType::Bit,
    ColumnType::Real64,
    ColumnType::Real32,
    ColumnType::Real16,
    ColumnType::UInt64,
    ColumnType::UInt32,
    ColumnType::UInt16,
    ColumnType::UInt8,
    ColumnType::SplitIndex64,
    ColumnType::SplitIndex32,
    ColumnType::SplitReal64,
    ColumnType::SplitReal32,
    ColumnType::SplitUInt64,
    ColumnType::SplitUInt32,
    ColumnType::SplitUInt16,
    ColumnType::Int64,
    ColumnType::Int32,
    ColumnType::Int16,
    ColumnType::Int8,
    ColumnType::SplitInt64,
    ColumnType::SplitInt32,
    ColumnType::SplitInt16,
];

impl ColumnType {
    pub const fn layout(self) -> ElementLayout {
        use Packing::*;
        match self {
            ColumnType::Index64 => layout(0x01, 64, 8, Plain, "Index64"),
            ColumnType::Index32 => layout(0x02, 32, 4, Plain, "Index32"),
            ColumnType::Switch => layout(0x03, 96, 12, Plain, "Switch"),
            ColumnType::Byte => layout(0x04, 8, 1, Plain, "Byte"),
            ColumnType::Char => layout(0x05, 8, 1, Plain, "Char"),
            ColumnType::Bit => layout(0x06, 1, 1, Bits, "Bit"),
            ColumnType::Real64 => layout(0x07, 64, 8, Plain, "Real64"),
            ColumnType::Real32 => layout(0x08, 32, 4, Plain, "Real32"),
            ColumnType::Real16 => layout(0x09, 16, 2, Plain, "Real16"),
            ColumnType::UInt64 => layout(0x0A, 64, 8, Plain, "UInt64"),
            ColumnType::UInt32 => layout(0x0B, 32, 4, Plain, "UInt32"),
            ColumnType::UInt16 => layout(0x0C, 16, 2, Plain, "UInt16"),
            ColumnType::UInt8 => layout(0x0D, 8, 1, Plain, "UInt8"),
            ColumnType::SplitIndex64 => layout(0x0E, 64, 8, SplitDelta, "SplitIndex64"),
            ColumnType::SplitIndex32 => layout(0x0F, 32, 4, SplitDelta, "SplitIndex32"),
            ColumnType::SplitReal64 => layout(0x10, 64, 8, Split, "SplitReal64"),
            ColumnType::SplitReal32 => layout(0x11, 32, 4, Split, "SplitReal32"),
            ColumnType::SplitUInt64 => layout(0x12, 64, 8, Split, "SplitUInt64"),
            ColumnType::SplitUInt32 => layout(0x13, 32, 4, Split, "SplitUInt32"),
            ColumnType::SplitUInt16 => layout(0x14, 16, 2, Split, "SplitUInt16"),
            ColumnType::Int64 => layout(0x16, 64, 8, Plain, "Int64"),
            ColumnType::Int32 => layout(0x17, 32, 4, Plain, "Int32"),
            ColumnType::Int16 => layout(0x18, 16, 2, Plain, "Int16"),
            ColumnType::Int8 => layout(0x19, 8, 1, Plain, "Int8"),
            ColumnType::SplitInt64 => layout(0x1A, 64, 8, SplitZigzag, "SplitInt64"),
            ColumnType::SplitInt32 => layout(0x1B, 32, 4, SplitZigzag, "SplitInt32"),
            ColumnType::SplitInt16 => layout(0x1C, 16, 2, SplitZigzag, "SplitInt16"),
        }
    }

    pub fn from_disk(code: u16) -> Result<Self, Error> {
        ALL_COLUMN_TYPES
            .iter()
            .copied()
            .find(|ty| ty.layout().disk_code == code)
            .ok_or_else(|| {
                Error::new(ErrorKind::Corrupt)
                    .with_message(format!("unknown column type code 0x{code:02x}"))
            })
    }

    pub fn disk_code(self) -> u16 {
        self.layout().disk_code
    }

    pub fn bits_on_storage(self) -> u16 {
        self.layout().bits_on_storage
    }

    pub fn element_size(self) -> usize {
        self.layout().element_size
    }

    pub fn packing(self) -> Packing {
        self.layout().packing
    }

    /// Number of bytes `n_elements` occupy in a sealed page before compression.
    pub fn packed_size(self, n_elements: u64) -> Option<usize> {
        let bits = n_elements.checked_mul(self.bits_on_storage() as u64)?;
        usize::try_from(bits.div_ceil(8)).ok()
    }

    /// Number of bytes `n_elements` occupy once unsealed.
    pub fn unpacked_size(self, n_elements: u64) -> Option<usize> {
        let bytes = n_elements.checked_mul(self.element_size() as u64)?;
        usize::try_from(bytes).ok()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout().name)
    }
}
