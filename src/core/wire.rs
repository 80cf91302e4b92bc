// Little-endian metadata primitives: size-then-fill writer, bounded reader, frames, envelopes.
//
// Record frame: i32 size (> 0, includes the size field), then content.
// List frame:   i32 -size, u32 item count, then items.
// Envelope:     u16 version, u16 min version, payload, u32 CRC32 of everything before it.
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{self, ENVELOPE_MIN_VERSION, ENVELOPE_VERSION};

pub const ENVELOPE_PREAMBLE_LEN: usize = 4;
pub const ENVELOPE_CHECKSUM_LEN: usize = 4;

/// Serializes into `buf` when present; otherwise only counts bytes.
pub struct Writer<'a> {
    buf: Option<&'a mut [u8]>,
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: Option<&'a mut [u8]>) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_sizing(&self) -> bool {
        self.buf.is_none()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.pos + bytes.len();
        if let Some(buf) = self.buf.as_deref_mut() {
            if end > buf.len() {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message("destination buffer too small")
                    .with_offset(self.pos as u64));
            }
            buf[self.pos..end].copy_from_slice(bytes);
        }
        self.pos = end;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), Error> {
        let len = u32::try_from(value.len()).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument).with_message("string exceeds u32 length")
        })?;
        self.write_u32(len)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn record_frame<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let start = self.pos;
        self.write_i32(0)?;
        body(self)?;
        let size = frame_size(self.pos - start)?;
        self.patch_i32(start, size)
    }

    pub fn list_frame<F>(&mut self, n_items: usize, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let n_items = u32::try_from(n_items).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument).with_message("list frame has too many items")
        })?;
        let start = self.pos;
        self.write_i32(0)?;
        self.write_u32(n_items)?;
        body(self)?;
        let size = frame_size(self.pos - start)?;
        self.patch_i32(start, -size)
    }

    /// Wraps `body` in an envelope; returns the envelope checksum when filling.
    pub fn envelope<F>(&mut self, body: F) -> Result<Option<u32>, Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let start = self.pos;
        self.write_u16(ENVELOPE_VERSION)?;
        self.write_u16(ENVELOPE_MIN_VERSION)?;
        body(self)?;
        let checksum = self
            .buf
            .as_deref()
            .map(|buf| crc32fast::hash(&buf[start..self.pos]));
        self.write_u32(checksum.unwrap_or(0))?;
        Ok(checksum)
    }

    /// Ends serialization; a filled buffer must be consumed exactly.
    pub fn finish(self) -> Result<usize, Error> {
        if let Some(buf) = self.buf.as_deref() {
            if buf.len() != self.pos {
                return Err(Error::new(ErrorKind::InvalidArgument).with_message(format!(
                    "destination buffer is {} bytes but serialization produced {}",
                    buf.len(),
                    self.pos
                )));
            }
        }
        Ok(self.pos)
    }

    fn patch_i32(&mut self, at: usize, value: i32) -> Result<(), Error> {
        if let Some(buf) = self.buf.as_deref_mut() {
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }
}

fn frame_size(len: usize) -> Result<i32, Error> {
    i32::try_from(len)
        .map_err(|_| Error::new(ErrorKind::InvalidArgument).with_message("frame exceeds 2 GiB"))
}

#[derive(Clone, Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("metadata truncated")
                .with_offset(self.pos as u64));
        }
        let buf = self.buf;
        let out = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("metadata string is not utf-8")
                .with_source(err)
        })
    }

    /// Consumes one record frame and returns a reader bounded to its content.
    pub fn record_frame(&mut self) -> Result<Reader<'a>, Error> {
        let start = self.pos;
        let size = self.read_i32()?;
        if size < 4 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("expected record frame")
                .with_offset(start as u64));
        }
        self.frame_body(start, size as usize)
    }

    /// Consumes one list frame and returns its item count plus a bounded reader.
    pub fn list_frame(&mut self) -> Result<(u32, Reader<'a>), Error> {
        let start = self.pos;
        let size = self.read_i32()?;
        if size > -8 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("expected list frame")
                .with_offset(start as u64));
        }
        let n_items = self.read_u32()?;
        let body = self.frame_body(start, size.unsigned_abs() as usize)?;
        Ok((n_items, body))
    }

    fn frame_body(&mut self, start: usize, size: usize) -> Result<Reader<'a>, Error> {
        let end = start + size;
        if end > self.buf.len() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("frame exceeds enclosing block")
                .with_offset(start as u64));
        }
        let buf = self.buf;
        let body = Reader::new(&buf[self.pos..end]);
        self.pos = end;
        Ok(body)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }
}

/// Verifies an envelope and returns a reader over its payload.
pub fn open_envelope(bytes: &[u8]) -> Result<Reader<'_>, Error> {
    if bytes.len() < ENVELOPE_PREAMBLE_LEN + ENVELOPE_CHECKSUM_LEN {
        return Err(Error::new(ErrorKind::Corrupt).with_message("envelope too small"));
    }
    let body_end = bytes.len() - ENVELOPE_CHECKSUM_LEN;
    let stored = envelope_checksum(bytes)?;
    let computed = crc32fast::hash(&bytes[..body_end]);
    if stored != computed {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "envelope checksum mismatch (stored {stored:08x}, computed {computed:08x})"
        )));
    }
    let mut preamble = Reader::new(&bytes[..ENVELOPE_PREAMBLE_LEN]);
    let _version = preamble.read_u16()?;
    let min_version = preamble.read_u16()?;
    if min_version > ENVELOPE_VERSION {
        return Err(format::envelope_version_error(min_version));
    }
    Ok(Reader::new(&bytes[ENVELOPE_PREAMBLE_LEN..body_end]))
}

pub fn envelope_checksum(bytes: &[u8]) -> Result<u32, Error> {
    let tail = bytes
        .len()
        .checked_sub(ENVELOPE_CHECKSUM_LEN)
        .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("envelope too small"))?;
    let mut reader = Reader::new(&bytes[tail..]);
    reader.read_u32()
}
