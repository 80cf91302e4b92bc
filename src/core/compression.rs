//! Purpose: Block compression used for pages and metadata envelopes.
//! Exports: `Algorithm`, `compress`, `decompress`, `MAX_BLOCK_SIZE`, `BLOCK_HEADER_SIZE`.
//! Role: Shared by the page unsealer, the file page source and test fixtures.
//! Invariants: Settings are `algorithm * 100 + level`; level 0 or algorithm 0 stores data raw.
//! Invariants: A payload whose stored size equals its logical size is raw and never parsed.
//! Invariants: Each block starts with a 2-byte tag, a method byte, u24 stored and u24 raw sizes.
use std::io::{Read, Write};

use flate2::Compression;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::core::error::{Error, ErrorKind};

pub const BLOCK_HEADER_SIZE: usize = 9;
pub const MAX_BLOCK_SIZE: usize = 0xff_ffff;

const ZLIB_TAG: [u8; 2] = *b"ZL";
const ZSTD_TAG: [u8; 2] = *b"ZS";
const ZLIB_METHOD: u8 = 8;
const ZSTD_METHOD: u8 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Algorithm {
    None,
    Zlib,
    Zstd,
}

impl Algorithm {
    /// Splits packed settings into algorithm and level.
    pub fn from_settings(settings: u32) -> Result<(Self, u32), Error> {
        let level = settings % 100;
        let algorithm = match settings / 100 {
            0 => Algorithm::None,
            1 => Algorithm::Zlib,
            5 => Algorithm::Zstd,
            other => {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("unknown compression algorithm {other}")));
            }
        };
        if level == 0 {
            return Ok((Algorithm::None, 0));
        }
        Ok((algorithm, level))
    }
}

/// Compresses `src` with packed `settings`; returns `src` unchanged if nothing is gained.
pub fn compress(src: &[u8], settings: u32) -> Result<Vec<u8>, Error> {
    let (algorithm, level) = Algorithm::from_settings(settings)?;
    if algorithm == Algorithm::None || src.is_empty() {
        return Ok(src.to_vec());
    }
    let mut out = Vec::with_capacity(src.len());
    for chunk in src.chunks(MAX_BLOCK_SIZE) {
        let (tag, method, body) = match algorithm {
            Algorithm::Zlib => (ZLIB_TAG, ZLIB_METHOD, zlib_compress(chunk, level)?),
            Algorithm::Zstd => (ZSTD_TAG, ZSTD_METHOD, zstd_compress(chunk, level)?),
            Algorithm::None => return Ok(src.to_vec()),
        };
        if body.len() >= chunk.len() || body.len() > MAX_BLOCK_SIZE {
            return Ok(src.to_vec());
        }
        out.extend_from_slice(&tag);
        out.push(method);
        out.extend_from_slice(&u24(body.len()));
        out.extend_from_slice(&u24(chunk.len()));
        out.extend_from_slice(&body);
    }
    if out.len() >= src.len() {
        return Ok(src.to_vec());
    }
    Ok(out)
}

/// Inflates `src` into exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>, Error> {
    if src.len() == expected_len {
        return Ok(src.to_vec());
    }
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0usize;
    while pos < src.len() {
        let header = src.get(pos..pos + BLOCK_HEADER_SIZE).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message("truncated compression block header")
                .with_offset(pos as u64)
        })?;
        let stored = read_u24(&header[3..6]);
        let raw = read_u24(&header[6..9]);
        let body_start = pos + BLOCK_HEADER_SIZE;
        let body = src.get(body_start..body_start + stored).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message("compression block exceeds payload")
                .with_offset(pos as u64)
        })?;
        let block = match [header[0], header[1]] {
            ZLIB_TAG => zlib_decompress(body, raw)?,
            ZSTD_TAG => zstd_decompress(body)?,
            tag => {
                let tag = String::from_utf8_lossy(&tag);
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("unknown compression tag {tag:?}"))
                    .with_offset(pos as u64));
            }
        };
        if block.len() != raw {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "compression block inflated to {} bytes, header says {raw}",
                    block.len()
                ))
                .with_offset(pos as u64));
        }
        out.extend_from_slice(&block);
        pos = body_start + stored;
    }
    if out.len() != expected_len {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "decompressed {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

fn zlib_compress(src: &[u8], level: u32) -> Result<Vec<u8>, Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(src).map_err(codec_error)?;
    encoder.finish().map_err(codec_error)
}

fn zlib_decompress(src: &[u8], raw_len: usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(raw_len);
    ZlibDecoder::new(src)
        .read_to_end(&mut out)
        .map_err(|err| corrupt_block(err, "zlib"))?;
    Ok(out)
}

fn zstd_compress(src: &[u8], level: u32) -> Result<Vec<u8>, Error> {
    zstd::stream::encode_all(src, level.min(22) as i32).map_err(codec_error)
}

fn zstd_decompress(src: &[u8]) -> Result<Vec<u8>, Error> {
    zstd::stream::decode_all(src).map_err(|err| corrupt_block(err, "zstd"))
}

fn codec_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("compression failed")
        .with_source(err)
}

fn corrupt_block(err: std::io::Error, codec: &str) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(format!("{codec} block does not decompress"))
        .with_source(err)
}

fn u24(value: usize) -> [u8; 3] {
    let bytes = (value as u32).to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

fn read_u24(bytes: &[u8]) -> usize {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as usize
}
