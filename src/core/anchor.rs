// Container file header, per-ntuple anchors and the name directory that locates them.
use crate::core::descriptor::Locator;
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{
    self, ANCHOR_VERSION_EPOCH, ANCHOR_VERSION_MAJOR, CONTAINER_VERSION,
    SUPPORTED_CONTAINER_VERSIONS,
};

const MAGIC: [u8; 4] = *b"NTPK";
const ENDIANNESS_LE: u8 = 1;
pub const CONTAINER_HEADER_SIZE: usize = 32;
pub const ANCHOR_SIZE: usize = 56;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContainerHeader {
    pub directory_offset: u64,
    pub directory_len: u64,
}

impl ContainerHeader {
    pub fn encode(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut buf = [0u8; CONTAINER_HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
        buf[8] = ENDIANNESS_LE;
        write_u64(&mut buf, 16, self.directory_offset);
        write_u64(&mut buf, 24, self.directory_len);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < CONTAINER_HEADER_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("container header too small"));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("bad magic")
                .with_hint("The file is not an ntuple container."));
        }
        let version = u32::from_le_bytes(read_4(buf, 4));
        if !SUPPORTED_CONTAINER_VERSIONS.contains(&version) {
            return Err(format::container_version_error(version));
        }
        if buf[8] != ENDIANNESS_LE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unsupported endianness"));
        }
        Ok(Self {
            directory_offset: read_u64(buf, 16),
            directory_len: read_u64(buf, 24),
        })
    }

    pub fn validate(&self, actual_file_size: u64) -> Result<(), Error> {
        let end = self.directory_offset.checked_add(self.directory_len);
        if self.directory_offset < CONTAINER_HEADER_SIZE as u64
            || end.is_none_or(|end| end > actual_file_size)
        {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("directory lies outside the file")
                .with_offset(self.directory_offset));
        }
        Ok(())
    }
}

/// Where the metadata envelopes of one ntuple live.
///
/// A block whose stored size differs from its length is compressed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Anchor {
    pub seek_header: u64,
    pub nbytes_header: u64,
    pub len_header: u64,
    pub seek_footer: u64,
    pub nbytes_footer: u64,
    pub len_footer: u64,
}

impl Anchor {
    pub fn header_locator(&self) -> Result<Locator, Error> {
        locator(self.seek_header, self.nbytes_header)
    }

    pub fn footer_locator(&self) -> Result<Locator, Error> {
        locator(self.seek_footer, self.nbytes_footer)
    }

    pub fn encode(&self) -> [u8; ANCHOR_SIZE] {
        let mut buf = [0u8; ANCHOR_SIZE];
        buf[0..2].copy_from_slice(&ANCHOR_VERSION_EPOCH.to_le_bytes());
        buf[2..4].copy_from_slice(&ANCHOR_VERSION_MAJOR.to_le_bytes());
        write_u64(&mut buf, 8, self.seek_header);
        write_u64(&mut buf, 16, self.nbytes_header);
        write_u64(&mut buf, 24, self.len_header);
        write_u64(&mut buf, 32, self.seek_footer);
        write_u64(&mut buf, 40, self.nbytes_footer);
        write_u64(&mut buf, 48, self.len_footer);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < ANCHOR_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("anchor too small"));
        }
        let epoch = u16::from_le_bytes([buf[0], buf[1]]);
        if epoch != ANCHOR_VERSION_EPOCH {
            return Err(format::anchor_epoch_error(epoch));
        }
        Ok(Self {
            seek_header: read_u64(buf, 8),
            nbytes_header: read_u64(buf, 16),
            len_header: read_u64(buf, 24),
            seek_footer: read_u64(buf, 32),
            nbytes_footer: read_u64(buf, 40),
            len_footer: read_u64(buf, 48),
        })
    }
}

fn locator(offset: u64, nbytes: u64) -> Result<Locator, Error> {
    let size = u32::try_from(nbytes).map_err(|_| {
        Error::new(ErrorKind::Corrupt)
            .with_message("metadata block exceeds 4 GiB")
            .with_offset(offset)
    })?;
    Ok(Locator { offset, size })
}

/// Named anchors stored at `ContainerHeader::directory_offset`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Directory {
    entries: Vec<(String, Anchor)>,
}

impl Directory {
    pub fn insert(&mut self, name: impl Into<String>, anchor: Anchor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = anchor,
            None => self.entries.push((name, anchor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Anchor> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, anchor)| anchor)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let count = u32::try_from(self.entries.len()).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument).with_message("too many directory entries")
        })?;
        let mut buf = Vec::new();
        buf.extend_from_slice(&count.to_le_bytes());
        for (name, anchor) in &self.entries {
            let len = u16::try_from(name.len()).map_err(|_| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("ntuple name is too long ({} bytes)", name.len()))
            })?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&anchor.encode());
        }
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let truncated = || Error::new(ErrorKind::Corrupt).with_message("directory truncated");
        let count = buf.get(0..4).ok_or_else(truncated)?;
        let count = u32::from_le_bytes(read_4(count, 0));
        let mut pos = 4usize;
        let mut entries = Vec::new();
        for _ in 0..count {
            let len = buf.get(pos..pos + 2).ok_or_else(truncated)?;
            let len = u16::from_le_bytes([len[0], len[1]]) as usize;
            pos += 2;
            let name = buf.get(pos..pos + len).ok_or_else(truncated)?;
            let name = std::str::from_utf8(name).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("ntuple name is not utf-8")
                    .with_offset(pos as u64)
                    .with_source(err)
            })?;
            pos += len;
            let anchor = buf.get(pos..pos + ANCHOR_SIZE).ok_or_else(truncated)?;
            entries.push((name.to_string(), Anchor::decode(anchor)?));
            pos += ANCHOR_SIZE;
        }
        Ok(Self { entries })
    }
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(out)
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
