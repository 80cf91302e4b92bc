// Lazy column reader: walks every page of a column in cluster storage order.
use tracing::debug;

use crate::core::column_type::ColumnType;
use crate::core::decode::{self, ColumnValue, PageValues};
use crate::core::descriptor::{Descriptor, DescriptorGuard, DescriptorId};
use crate::core::error::{Error, ErrorKind};
use crate::core::page_source::{ClusterIndex, PageResolver, PageSource};

/// Decoded values of one column, at most `limit` of them.
///
/// Pages are loaded one at a time and only when the previous page is exhausted; once the
/// limit is reached nothing else is read. The descriptor guard is held until drop.
pub struct ColumnValues<'a, S: PageSource + ?Sized> {
    source: &'a S,
    guard: DescriptorGuard<'a>,
    column_id: DescriptorId,
    column_type: ColumnType,
    pages: std::vec::IntoIter<ClusterIndex>,
    current: Option<PageValues>,
    remaining: Option<u64>,
    failed: bool,
}

impl<'a, S: PageSource + ?Sized> ColumnValues<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        column_id: DescriptorId,
        limit: Option<u64>,
    ) -> Result<Self, Error> {
        let guard = source.shared_descriptor_guard()?;
        let column_type = guard
            .column(column_id)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("column {column_id} does not exist"))
                    .with_column(column_id)
            })?
            .column_type;
        if decode::element_codec(column_type).decode.is_none() {
            return Err(decode::unsupported_type(column_type).with_column(column_id));
        }
        let pages = page_starts(&guard, column_id);
        debug!(column = column_id, %column_type, pages = pages.len(), "reading column");
        Ok(Self {
            source,
            guard,
            column_id,
            column_type,
            pages: pages.into_iter(),
            current: None,
            remaining: limit,
            failed: false,
        })
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn load_next_page(&mut self) -> Result<Option<PageValues>, Error> {
        let Some(at) = self.pages.next() else {
            return Ok(None);
        };
        let resolver = PageResolver::new(self.source, &self.guard);
        let sealed = resolver.load_sealed_page(self.column_id, at)?;
        let raw = resolver
            .unseal_page(&sealed, self.column_type)
            .map_err(|err| err.with_column(self.column_id))?;
        decode::decode(raw, self.column_type).map(Some)
    }
}

impl<S: PageSource + ?Sized> Iterator for ColumnValues<'_, S> {
    type Item = Result<ColumnValue, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == Some(0) {
            return None;
        }
        loop {
            if let Some(value) = self.current.as_mut().and_then(Iterator::next) {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(value));
            }
            match self.load_next_page() {
                Ok(Some(page)) => self.current = Some(page),
                Ok(None) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// First element index of every page of `column_id`, cluster by cluster in storage order.
fn page_starts(descriptor: &Descriptor, column_id: DescriptorId) -> Vec<ClusterIndex> {
    let mut out = Vec::new();
    for cluster in descriptor.clusters() {
        let Some(range) = cluster.page_range(column_id) else {
            continue;
        };
        let mut first = 0u64;
        for page in &range.page_infos {
            if page.n_elements > 0 {
                out.push(ClusterIndex::new(cluster.id, first));
            }
            first += page.n_elements as u64;
        }
    }
    out
}
