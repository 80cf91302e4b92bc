//! Purpose: Rebuild the header, page-list and footer envelopes from a descriptor.
//! Exports: `SerializationContext`, `serialize_header`, `serialize_page_list`, `serialize_footer`, `MetadataSession`.
//! Role: Metadata re-serializer; the `serialize_*` calls count bytes when given no buffer and fill otherwise.
//! Invariants: The context is born in `serialize_header`; page lists must be mapped before the footer.
//! Invariants: Identical descriptors always produce identical bytes.
use std::collections::HashMap;

use tracing::debug;

use crate::core::descriptor::{
    ClusterDescriptor, ClusterGroupDescriptor, ColumnDescriptor, Descriptor, DescriptorId,
    FIELD_ZERO_ID, FieldDescriptor,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::wire::Writer;

pub const FEATURE_FLAGS: u64 = 0;
pub const FIELD_FLAG_REPETITIVE: u16 = 0x01;
/// Stored as the first element index of a column that has no data in a cluster.
pub const ABSENT_COLUMN_MARKER: i64 = -1;

/// Maps in-memory ids to the dense on-disk ids of one serialization session.
#[derive(Clone, Debug, Default)]
pub struct SerializationContext {
    header_size: usize,
    header_checksum: u32,
    fields: HashMap<DescriptorId, DescriptorId>,
    columns: HashMap<DescriptorId, DescriptorId>,
    clusters: HashMap<DescriptorId, DescriptorId>,
    cluster_order: Vec<DescriptorId>,
    cluster_groups: HashMap<DescriptorId, DescriptorId>,
    cluster_group_order: Vec<DescriptorId>,
}

impl SerializationContext {
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// CRC32 of the header envelope; zero after a sizing-only pass.
    pub fn header_checksum(&self) -> u32 {
        self.header_checksum
    }

    pub fn map_field_id(&mut self, mem_id: DescriptorId) -> DescriptorId {
        let next = self.fields.len() as DescriptorId;
        *self.fields.entry(mem_id).or_insert(next)
    }

    pub fn map_column_id(&mut self, mem_id: DescriptorId) -> DescriptorId {
        let next = self.columns.len() as DescriptorId;
        *self.columns.entry(mem_id).or_insert(next)
    }

    pub fn map_cluster_id(&mut self, mem_id: DescriptorId) -> DescriptorId {
        if let Some(phys) = self.clusters.get(&mem_id) {
            return *phys;
        }
        let phys = self.cluster_order.len() as DescriptorId;
        self.clusters.insert(mem_id, phys);
        self.cluster_order.push(mem_id);
        phys
    }

    pub fn map_cluster_group_id(&mut self, mem_id: DescriptorId) -> DescriptorId {
        if let Some(phys) = self.cluster_groups.get(&mem_id) {
            return *phys;
        }
        let phys = self.cluster_group_order.len() as DescriptorId;
        self.cluster_groups.insert(mem_id, phys);
        self.cluster_group_order.push(mem_id);
        phys
    }

    pub fn phys_field_id(&self, mem_id: DescriptorId) -> Result<DescriptorId, Error> {
        lookup(&self.fields, mem_id, "field")
    }

    pub fn phys_column_id(&self, mem_id: DescriptorId) -> Result<DescriptorId, Error> {
        lookup(&self.columns, mem_id, "column")
    }

    pub fn mem_cluster_id(&self, phys_id: DescriptorId) -> Option<DescriptorId> {
        usize::try_from(phys_id)
            .ok()
            .and_then(|idx| self.cluster_order.get(idx))
            .copied()
    }

    pub fn n_clusters(&self) -> usize {
        self.cluster_order.len()
    }

    pub fn n_cluster_groups(&self) -> usize {
        self.cluster_group_order.len()
    }
}

fn lookup(
    map: &HashMap<DescriptorId, DescriptorId>,
    mem_id: DescriptorId,
    what: &str,
) -> Result<DescriptorId, Error> {
    map.get(&mem_id).copied().ok_or_else(|| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("{what} {mem_id} was not mapped by the header"))
    })
}

fn disk_id(id: DescriptorId) -> Result<u32, Error> {
    u32::try_from(id).map_err(|_| {
        Error::new(ErrorKind::InvalidArgument).with_message(format!("id {id} exceeds u32"))
    })
}

/// Serializes the header envelope and returns a fresh context describing it.
pub fn serialize_header(
    buf: Option<&mut [u8]>,
    descriptor: &Descriptor,
) -> Result<SerializationContext, Error> {
    let mut context = SerializationContext::default();
    let fields: Vec<&FieldDescriptor> = descriptor
        .subtree_fields(FIELD_ZERO_ID)
        .into_iter()
        .filter(|field| field.id != FIELD_ZERO_ID)
        .collect();
    for field in &fields {
        context.map_field_id(field.id);
    }
    for column in descriptor.columns() {
        context.map_column_id(column.physical_id);
    }

    let mut writer = Writer::new(buf);
    let checksum = writer.envelope(|w| {
        w.write_u64(FEATURE_FLAGS)?;
        w.write_string(descriptor.name())?;
        w.write_string(descriptor.description())?;
        w.write_string(descriptor.writer())?;
        w.write_u32(descriptor.compression_settings())?;
        w.list_frame(fields.len(), |w| {
            fields
                .iter()
                .try_for_each(|field| write_field(w, field, &context))
        })?;
        w.list_frame(descriptor.n_columns(), |w| {
            descriptor
                .columns()
                .try_for_each(|column| write_column(w, column, &context))
        })
    })?;
    context.header_size = writer.finish()?;
    context.header_checksum = checksum.unwrap_or(0);
    Ok(context)
}

fn write_field(
    w: &mut Writer<'_>,
    field: &FieldDescriptor,
    context: &SerializationContext,
) -> Result<(), Error> {
    let phys_id = context.phys_field_id(field.id)?;
    let parent_id = match field.parent_id {
        Some(parent) if parent != FIELD_ZERO_ID => context.phys_field_id(parent)?,
        _ => phys_id,
    };
    w.record_frame(|w| {
        w.write_u32(field.field_version)?;
        w.write_u32(field.type_version)?;
        w.write_u32(disk_id(parent_id)?)?;
        w.write_u16(field.structure.to_disk())?;
        if field.n_repetitions > 0 {
            w.write_u16(FIELD_FLAG_REPETITIVE)?;
            w.write_u64(field.n_repetitions)?;
        } else {
            w.write_u16(0)?;
        }
        w.write_string(&field.name)?;
        w.write_string(&field.type_name)?;
        w.write_string(&field.type_alias)?;
        w.write_string(&field.description)
    })
}

fn write_column(
    w: &mut Writer<'_>,
    column: &ColumnDescriptor,
    context: &SerializationContext,
) -> Result<(), Error> {
    w.record_frame(|w| {
        w.write_u16(column.column_type.disk_code())?;
        w.write_u16(column.column_type.bits_on_storage())?;
        w.write_u32(disk_id(context.phys_field_id(column.field_id)?)?)?;
        w.write_u32(0)
    })
}

/// Serializes the page list of the clusters named by their on-disk ids.
pub fn serialize_page_list(
    buf: Option<&mut [u8]>,
    descriptor: &Descriptor,
    phys_cluster_ids: &[DescriptorId],
    context: &SerializationContext,
) -> Result<usize, Error> {
    let mut clusters = Vec::with_capacity(phys_cluster_ids.len());
    for phys_id in phys_cluster_ids {
        let cluster = context
            .mem_cluster_id(*phys_id)
            .and_then(|mem_id| descriptor.cluster(mem_id))
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("on-disk cluster {phys_id} is not mapped"))
            })?;
        clusters.push(cluster);
    }

    let mut writer = Writer::new(buf);
    writer.envelope(|w| {
        w.list_frame(clusters.len(), |w| {
            clusters
                .iter()
                .try_for_each(|cluster| write_cluster_pages(w, descriptor, cluster))
        })
    })?;
    writer.finish()
}

fn write_cluster_pages(
    w: &mut Writer<'_>,
    descriptor: &Descriptor,
    cluster: &ClusterDescriptor,
) -> Result<(), Error> {
    w.list_frame(descriptor.n_columns(), |w| {
        for column in descriptor.columns() {
            let column_id = column.physical_id;
            let pages = cluster
                .page_range(column_id)
                .map(|range| range.page_infos.as_slice())
                .unwrap_or_default();
            w.list_frame(pages.len(), |w| {
                for page in pages {
                    w.write_i32(signed_u32(page.n_elements)?)?;
                    w.write_i32(signed_u32(page.locator.size)?)?;
                    w.write_u64(page.locator.offset)?;
                }
                Ok(())
            })?;
            match cluster.column_range(column_id) {
                Some(range) if cluster.contains_column(column_id) => {
                    let first = i64::try_from(range.first_element_index).map_err(|_| {
                        Error::new(ErrorKind::InvalidArgument)
                            .with_message("first element index exceeds i64")
                            .with_column(column_id)
                    })?;
                    w.write_i64(first)?;
                    w.write_u32(range.compression_settings)?;
                }
                _ => {
                    w.write_i64(ABSENT_COLUMN_MARKER)?;
                    w.write_u32(0)?;
                }
            }
        }
        Ok(())
    })
}

fn signed_u32(value: u32) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| {
        Error::new(ErrorKind::InvalidArgument).with_message(format!("{value} exceeds i32"))
    })
}

/// Serializes the footer for every cluster and cluster group the context has seen.
pub fn serialize_footer(
    buf: Option<&mut [u8]>,
    descriptor: &Descriptor,
    context: &SerializationContext,
) -> Result<usize, Error> {
    let mut clusters = Vec::with_capacity(context.n_clusters());
    for mem_id in &context.cluster_order {
        let cluster = descriptor.cluster(*mem_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound).with_message(format!("cluster {mem_id} vanished"))
        })?;
        clusters.push(cluster);
    }
    let mut groups: Vec<&ClusterGroupDescriptor> = Vec::with_capacity(context.n_cluster_groups());
    for mem_id in &context.cluster_group_order {
        let group = descriptor.cluster_group(*mem_id).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("cluster group {mem_id} vanished"))
        })?;
        groups.push(group);
    }

    let mut writer = Writer::new(buf);
    writer.envelope(|w| {
        w.write_u64(FEATURE_FLAGS)?;
        w.write_u32(context.header_checksum())?;
        // schema extension
        w.record_frame(|_| Ok(()))?;
        // column groups
        w.list_frame(0, |_| Ok(()))?;
        w.list_frame(clusters.len(), |w| {
            clusters.iter().try_for_each(|cluster| {
                w.record_frame(|w| {
                    w.write_u64(cluster.first_entry)?;
                    w.write_u64(cluster.n_entries)
                })
            })
        })?;
        w.list_frame(groups.len(), |w| {
            groups.iter().try_for_each(|group| {
                let n_clusters = u32::try_from(group.cluster_ids.len()).map_err(|_| {
                    Error::new(ErrorKind::InvalidArgument).with_message("too many clusters in group")
                })?;
                w.record_frame(|w| {
                    w.write_u64(group.min_entry)?;
                    w.write_u64(group.entry_span)?;
                    w.write_u32(n_clusters)?;
                    w.write_u32(group.page_list_length)?;
                    w.write_i32(signed_u32(group.page_list_locator.size)?)?;
                    w.write_u64(group.page_list_locator.offset)
                })
            })
        })
    })?;
    writer.finish()
}

/// One re-serialization pass: header first, then page lists, then the footer.
pub struct MetadataSession<'d> {
    descriptor: &'d Descriptor,
    context: SerializationContext,
}

impl<'d> MetadataSession<'d> {
    /// Serializes the header and opens the session.
    pub fn begin(descriptor: &'d Descriptor) -> Result<(Self, Vec<u8>), Error> {
        let size = serialize_header(None, descriptor)?.header_size();
        let mut buf = vec![0u8; size];
        let context = serialize_header(Some(&mut buf), descriptor)?;
        debug!(bytes = size, "serialized header");
        Ok((
            Self {
                descriptor,
                context,
            },
            buf,
        ))
    }

    pub fn context(&self) -> &SerializationContext {
        &self.context
    }

    pub fn page_list(&mut self, group: &ClusterGroupDescriptor) -> Result<Vec<u8>, Error> {
        let phys_cluster_ids: Vec<DescriptorId> = group
            .cluster_ids
            .iter()
            .map(|id| self.context.map_cluster_id(*id))
            .collect();
        self.context.map_cluster_group_id(group.id);

        let size = serialize_page_list(None, self.descriptor, &phys_cluster_ids, &self.context)?;
        let mut buf = vec![0u8; size];
        serialize_page_list(
            Some(&mut buf),
            self.descriptor,
            &phys_cluster_ids,
            &self.context,
        )?;
        debug!(group = group.id, bytes = size, "serialized page list");
        Ok(buf)
    }

    pub fn footer(self) -> Result<Vec<u8>, Error> {
        let size = serialize_footer(None, self.descriptor, &self.context)?;
        let mut buf = vec![0u8; size];
        serialize_footer(Some(&mut buf), self.descriptor, &self.context)?;
        debug!(bytes = size, "serialized footer");
        Ok(buf)
    }
}
