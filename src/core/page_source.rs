//! Purpose: Locate, read and unseal pages of a dataset.
//! Exports: `PageSource`, `FileSource`, `PageResolver`, `ClusterIndex`, `SealedPage`, `SealedPageInfo`.
//! Role: Storage seam between the descriptor view and the column decoder.
//! Invariants: Page k of a range covers elements starting at the sum of counts of pages 0..k.
//! Invariants: `read_sealed_page` fills a buffer of exactly `sealed_page_info().size` bytes.
//! Invariants: `FileSource` holds a shared advisory lock on the file for its lifetime.
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use fs2::FileExt;
use memmap2::Mmap;
use tracing::{debug, info};

use crate::core::anchor::{Anchor, CONTAINER_HEADER_SIZE, ContainerHeader, Directory};
use crate::core::column_type::ColumnType;
use crate::core::compression;
use crate::core::descriptor::{Descriptor, DescriptorGuard, DescriptorId, Locator, PageInfo};
use crate::core::deserialize::{deserialize_footer, deserialize_header, deserialize_page_list};
use crate::core::error::{Error, ErrorKind, io_error};
use crate::core::unseal::unseal;

/// A cluster plus a zero-based element offset within one column's page range there.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterIndex {
    pub cluster_id: DescriptorId,
    pub index: u64,
}

impl ClusterIndex {
    pub fn new(cluster_id: DescriptorId, index: u64) -> Self {
        Self { cluster_id, index }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedPage {
    pub buffer: Vec<u8>,
    pub n_elements: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SealedPageInfo {
    /// Exact number of stored bytes.
    pub size: usize,
    pub n_elements: u32,
    pub locator: Locator,
}

pub trait PageSource {
    fn shared_descriptor_guard(&self) -> Result<DescriptorGuard<'_>, Error>;

    /// Copies the bytes at `locator` into `buf`, which must be exactly `locator.size` long.
    fn read_bytes(&self, locator: Locator, buf: &mut [u8]) -> Result<(), Error>;
}

/// Resolves pages against a descriptor the caller already holds a guard on.
pub struct PageResolver<'a, S: PageSource + ?Sized> {
    source: &'a S,
    descriptor: &'a Descriptor,
}

impl<'a, S: PageSource + ?Sized> PageResolver<'a, S> {
    pub fn new(source: &'a S, descriptor: &'a Descriptor) -> Self {
        Self { source, descriptor }
    }

    /// Finds the page holding element `at.index` of `column_id` in `at.cluster_id`.
    pub fn locate(&self, column_id: DescriptorId, at: ClusterIndex) -> Result<PageInfo, Error> {
        if self.descriptor.column(column_id).is_none() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("no such column")
                .with_column(column_id));
        }
        let cluster = self.descriptor.cluster(at.cluster_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("cluster {} does not exist", at.cluster_id))
                .with_column(column_id)
        })?;
        let range = cluster.page_range(column_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("column has no data in cluster {}", at.cluster_id))
                .with_column(column_id)
        })?;
        let mut first = 0u64;
        for page in &range.page_infos {
            let end = first + page.n_elements as u64;
            if at.index < end {
                return Ok(*page);
            }
            first = end;
        }
        Err(Error::new(ErrorKind::NotFound)
            .with_message(format!(
                "element {} is past the {first} elements of cluster {}",
                at.index, at.cluster_id
            ))
            .with_column(column_id))
    }

    /// Sizing half of the two-phase read.
    pub fn sealed_page_info(
        &self,
        column_id: DescriptorId,
        at: ClusterIndex,
    ) -> Result<SealedPageInfo, Error> {
        let page = self.locate(column_id, at)?;
        Ok(SealedPageInfo {
            size: page.locator.size as usize,
            n_elements: page.n_elements,
            locator: page.locator,
        })
    }

    /// Filling half of the two-phase read; returns the page's element count.
    pub fn read_sealed_page(
        &self,
        column_id: DescriptorId,
        at: ClusterIndex,
        buf: &mut [u8],
    ) -> Result<u32, Error> {
        let info = self.sealed_page_info(column_id, at)?;
        if buf.len() != info.size {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!(
                    "sealed page is {} bytes, buffer holds {}",
                    info.size,
                    buf.len()
                ))
                .with_column(column_id));
        }
        self.source
            .read_bytes(info.locator, buf)
            .map_err(|err| err.with_column(column_id))?;
        Ok(info.n_elements)
    }

    pub fn load_sealed_page(
        &self,
        column_id: DescriptorId,
        at: ClusterIndex,
    ) -> Result<SealedPage, Error> {
        let info = self.sealed_page_info(column_id, at)?;
        let mut buffer = vec![0u8; info.size];
        let n_elements = self.read_sealed_page(column_id, at, &mut buffer)?;
        debug!(
            column = column_id,
            cluster = at.cluster_id,
            index = at.index,
            bytes = info.size,
            n_elements,
            "loaded sealed page"
        );
        Ok(SealedPage { buffer, n_elements })
    }

    pub fn unseal_page(
        &self,
        page: &SealedPage,
        column_type: ColumnType,
    ) -> Result<Vec<u8>, Error> {
        unseal(&page.buffer, page.n_elements, column_type)
    }
}

/// Read-only view of one ntuple inside a container file.
pub struct FileSource {
    path: PathBuf,
    file: File,
    mmap: Mmap,
    descriptor: RwLock<Descriptor>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>, ntuple: &str) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|err| io_error(err, &path))?;
        FileExt::lock_shared(&file).map_err(|err| io_error(err, &path))?;
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(err) => {
                let _ = FileExt::unlock(&file);
                return Err(io_error(err, &path));
            }
        };

        let descriptor = match load_descriptor(&mmap, ntuple) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let _ = FileExt::unlock(&file);
                return Err(err.with_path(&path));
            }
        };
        info!(
            path = %path.display(),
            ntuple,
            fields = descriptor.n_fields(),
            columns = descriptor.n_columns(),
            clusters = descriptor.n_clusters(),
            "attached to dataset"
        );
        Ok(Self {
            path,
            file,
            mmap,
            descriptor: RwLock::new(descriptor),
        })
    }
}

impl PageSource for FileSource {
    fn shared_descriptor_guard(&self) -> Result<DescriptorGuard<'_>, Error> {
        DescriptorGuard::acquire(&self.descriptor)
    }

    fn read_bytes(&self, locator: Locator, buf: &mut [u8]) -> Result<(), Error> {
        let bytes = slice(&self.mmap, locator).map_err(|err| err.with_path(&self.path))?;
        if bytes.len() != buf.len() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!(
                    "locator covers {} bytes, buffer holds {}",
                    bytes.len(),
                    buf.len()
                ))
                .with_offset(locator.offset));
        }
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn slice(bytes: &[u8], locator: Locator) -> Result<&[u8], Error> {
    let start = usize::try_from(locator.offset).ok();
    let end = start.and_then(|start| start.checked_add(locator.size as usize));
    match (start, end) {
        (Some(start), Some(end)) if end <= bytes.len() => Ok(&bytes[start..end]),
        _ => Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "{} bytes at offset {} lie outside the {}-byte file",
                locator.size,
                locator.offset,
                bytes.len()
            ))
            .with_offset(locator.offset)),
    }
}

/// Reads a metadata block, inflating it when its stored size differs from `len`.
fn read_block(bytes: &[u8], locator: Locator, len: u64) -> Result<Vec<u8>, Error> {
    let stored = slice(bytes, locator)?;
    let len = usize::try_from(len).map_err(|_| {
        Error::new(ErrorKind::Corrupt)
            .with_message("metadata block length overflows")
            .with_offset(locator.offset)
    })?;
    compression::decompress(stored, len).map_err(|err| err.with_offset(locator.offset))
}

fn find_anchor(bytes: &[u8], ntuple: &str) -> Result<Anchor, Error> {
    let header = ContainerHeader::decode(bytes.get(..CONTAINER_HEADER_SIZE).unwrap_or(bytes))?;
    header.validate(bytes.len() as u64)?;
    let start = header.directory_offset as usize;
    let directory = Directory::decode(&bytes[start..start + header.directory_len as usize])?;
    directory.get(ntuple).copied().ok_or_else(|| {
        let available = directory.names().collect::<Vec<_>>().join(", ");
        Error::new(ErrorKind::NotFound)
            .with_message(format!("ntuple '{ntuple}' not found in file"))
            .with_hint(format!("Available ntuples: {available}"))
    })
}

fn load_descriptor(bytes: &[u8], ntuple: &str) -> Result<Descriptor, Error> {
    let anchor = find_anchor(bytes, ntuple)?;
    let header = read_block(bytes, anchor.header_locator()?, anchor.len_header)?;
    let (mut builder, header_checksum) = deserialize_header(&header)?;
    let footer = read_block(bytes, anchor.footer_locator()?, anchor.len_footer)?;
    let groups = deserialize_footer(&footer, &mut builder, header_checksum)?;
    for group in &groups {
        let page_list = read_block(
            bytes,
            group.page_list_locator,
            group.page_list_length as u64,
        )?;
        deserialize_page_list(&page_list, group, &mut builder)?;
        debug!(group = group.id, clusters = group.cluster_ids.len(), "loaded page list");
    }
    builder.build()
}
