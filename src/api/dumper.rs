//! Purpose: High-level dump operations shared by both binaries.
//! Exports: `Dumper`, `PageDumpOptions`, `check_output_file`, `check_output_dir`.
//! Role: Drives enumerator, resolver, unsealer, decoder and re-serializer against one source.
//! Invariants: Every operation holds the descriptor guard for its whole duration.
//! Invariants: Output targets are validated before any page is read.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::api::template::PageFileTemplate;
use crate::api::values::ColumnValues;
use crate::core::column_type::ColumnType;
use crate::core::columns::{self, ColumnInfo};
use crate::core::decode::ColumnValue;
use crate::core::descriptor::DescriptorId;
use crate::core::error::{Error, ErrorKind, io_error};
use crate::core::page_source::{ClusterIndex, FileSource, PageResolver, PageSource};
use crate::core::serialize::MetadataSession;

#[derive(Clone, Debug, Default)]
pub struct PageDumpOptions {
    pub template: PageFileTemplate,
}

pub struct Dumper<S: PageSource> {
    source: S,
}

impl Dumper<FileSource> {
    pub fn open(path: impl AsRef<Path>, ntuple: &str) -> Result<Self, Error> {
        Ok(Self::new(FileSource::open(path, ntuple)?))
    }
}

impl<S: PageSource> Dumper<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Columns below `field` (empty for all) in pre-order.
    pub fn collect_columns(&self, field: &str) -> Result<Vec<ColumnInfo>, Error> {
        let guard = self.source.shared_descriptor_guard()?;
        columns::collect_columns(&guard, field)
    }

    /// Writes every sealed page of `columns` into `dir`, one file per page.
    ///
    /// `progress` is called with (processed, total) after each cluster. Returns the number
    /// of clusters processed.
    pub fn dump_pages(
        &self,
        columns: &[ColumnInfo],
        dir: &Path,
        options: &PageDumpOptions,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<usize, Error> {
        check_output_dir(dir)?;
        for column in columns {
            options
                .template
                .file_name(0, &column.qual_name, 0)
                .map_err(|err| err.with_column(column.column_id))?;
        }
        let guard = self.source.shared_descriptor_guard()?;
        let resolver = PageResolver::new(&self.source, &guard);
        let total = guard.n_clusters();
        let mut written = 0usize;
        for (processed, cluster) in guard.clusters().enumerate() {
            for column in columns {
                let Some(range) = cluster.page_range(column.column_id) else {
                    continue;
                };
                let mut first = 0u64;
                for (page_no, page) in range.page_infos.iter().enumerate() {
                    let at = ClusterIndex::new(cluster.id, first);
                    first += page.n_elements as u64;
                    if page.n_elements == 0 {
                        continue;
                    }
                    let sealed = resolver.load_sealed_page(column.column_id, at)?;
                    let name = options
                        .template
                        .file_name(cluster.id, &column.qual_name, page_no)?;
                    write_file(&dir.join(name), &sealed.buffer)?;
                    written += 1;
                }
            }
            progress(processed + 1, total);
        }
        info!(clusters = total, pages = written, dir = %dir.display(), "dumped pages");
        Ok(total)
    }

    /// Re-serializes header, per-group page lists and footer into `dir`.
    pub fn dump_metadata(&self, dir: &Path) -> Result<Vec<PathBuf>, Error> {
        check_output_dir(dir)?;
        let guard = self.source.shared_descriptor_guard()?;
        let mut written = Vec::new();

        let (mut session, header) = MetadataSession::begin(&guard)?;
        written.push(write_named(dir, "header", &header)?);
        for (n, group) in guard.cluster_groups().enumerate() {
            let page_list = session.page_list(group)?;
            written.push(write_named(dir, &format!("cg{n}.pagelist"), &page_list)?);
        }
        let footer = session.footer()?;
        written.push(write_named(dir, "footer", &footer)?);
        Ok(written)
    }

    /// Type of `column_id`, failing up front when the column is missing or undecodable.
    pub fn decodable_column_type(&self, column_id: DescriptorId) -> Result<ColumnType, Error> {
        Ok(self.column_values(column_id, Some(0))?.column_type())
    }

    /// Lazily decoded values of one column; `Some(0)` yields nothing.
    pub fn column_values(
        &self,
        column_id: DescriptorId,
        limit: Option<u64>,
    ) -> Result<ColumnValues<'_, S>, Error> {
        ColumnValues::new(&self.source, column_id, limit)
    }

    /// Writes one value per line; returns how many were written.
    pub fn dump_column_data(
        &self,
        column_id: DescriptorId,
        limit: Option<u64>,
        out: &mut dyn Write,
    ) -> Result<u64, Error> {
        let mut count = 0u64;
        for value in self.column_values(column_id, limit)? {
            match value? {
                // Stored bytes go out unchanged, whatever their encoding.
                ColumnValue::Char(byte) => out.write_all(&[byte, b'\n']),
                value => writeln!(out, "{value}"),
            }
            .map_err(output_error)?;
            count += 1;
        }
        out.flush().map_err(output_error)?;
        Ok(count)
    }
}

fn output_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}

fn write_named(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
    let path = dir.join(name);
    write_file(&path, bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote metadata");
    Ok(path)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    fs::write(path, bytes).map_err(|err| io_error(err, path))
}

/// An output file path must name its directory, e.g. `./values.txt` rather than `values.txt`.
pub fn check_output_file(path: &Path) -> Result<(), Error> {
    let has_parent = path
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if !has_parent {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!(
                "output path '{}' has no directory component",
                path.display()
            ))
            .with_path(path)
            .with_hint("Prefix the file name with a directory, e.g. ./values.txt."));
    }
    Ok(())
}

pub fn check_output_dir(dir: &Path) -> Result<(), Error> {
    if !dir.is_dir() {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("output directory '{}' does not exist", dir.display()))
            .with_path(dir));
    }
    Ok(())
}
