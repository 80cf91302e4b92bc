// Parses header, footer and page-list envelopes into a DescriptorBuilder.
use crate::core::column_type::ColumnType;
use crate::core::descriptor::{
    ClusterGroupDescriptor, ColumnRange, DescriptorBuilder, DescriptorId, FIELD_ZERO_ID, Locator,
    NewField, PageInfo, PageRange, StructureRole,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::serialize::{ABSENT_COLUMN_MARKER, FIELD_FLAG_REPETITIVE};
use crate::core::wire::{Reader, envelope_checksum, open_envelope};

/// Element count, size and offset of one page.
const PAGE_INFO_SIZE: usize = 4 + 4 + 8;

fn corrupt(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

/// Rejects item counts that cannot fit in the list body, before anything is allocated for them.
fn bounded_count(
    n_items: u32,
    body: &Reader<'_>,
    min_item_size: usize,
    what: &str,
) -> Result<usize, Error> {
    let n = n_items as usize;
    if n.saturating_mul(min_item_size) > body.remaining() {
        return Err(corrupt(format!(
            "{what} list claims {n} items but holds only {} bytes",
            body.remaining()
        )));
    }
    Ok(n)
}

/// Returns a builder holding the schema plus the header envelope checksum.
pub fn deserialize_header(bytes: &[u8]) -> Result<(DescriptorBuilder, u32), Error> {
    let mut reader = open_envelope(bytes)?;
    let checksum = envelope_checksum(bytes)?;

    let _feature_flags = reader.read_u64()?;
    let name = reader.read_string()?;
    let mut builder = DescriptorBuilder::new(name);
    builder
        .description(reader.read_string()?)
        .writer(reader.read_string()?)
        .compression_settings(reader.read_u32()?);

    let (n_fields, mut fields) = reader.list_frame()?;
    for disk_id in 0..n_fields {
        let mut record = fields.record_frame()?;
        read_field(&mut record, disk_id, &mut builder)?;
    }

    let (n_columns, mut columns) = reader.list_frame()?;
    for _ in 0..n_columns {
        let mut record = columns.record_frame()?;
        let code = record.read_u16()?;
        let bits = record.read_u16()?;
        let field_disk_id = record.read_u32()?;
        let _flags = record.read_u32()?;
        let column_type = ColumnType::from_disk(code)?;
        if bits != column_type.bits_on_storage() {
            return Err(corrupt(format!(
                "column of type {column_type} declares {bits} bits on storage (expected {})",
                column_type.bits_on_storage()
            )));
        }
        let field_id = mem_field_id(field_disk_id);
        if field_id as usize >= builder.n_fields() {
            return Err(corrupt(format!(
                "column references unknown field {field_disk_id}"
            )));
        }
        builder.add_column(field_id, column_type)?;
    }
    Ok((builder, checksum))
}

fn mem_field_id(disk_id: u32) -> DescriptorId {
    DescriptorId::from(disk_id) + 1
}

fn read_field(
    record: &mut Reader<'_>,
    disk_id: u32,
    builder: &mut DescriptorBuilder,
) -> Result<(), Error> {
    let field_version = record.read_u32()?;
    let type_version = record.read_u32()?;
    let parent_disk_id = record.read_u32()?;
    let structure = StructureRole::from_disk(record.read_u16()?)?;
    let flags = record.read_u16()?;
    let n_repetitions = if flags & FIELD_FLAG_REPETITIVE != 0 {
        record.read_u64()?
    } else {
        0
    };
    let name = record.read_string()?;
    let type_name = record.read_string()?;
    let type_alias = record.read_string()?;
    let description = record.read_string()?;

    let parent_id = if parent_disk_id == disk_id {
        FIELD_ZERO_ID
    } else if parent_disk_id < disk_id {
        mem_field_id(parent_disk_id)
    } else {
        return Err(corrupt(format!(
            "field {disk_id} names parent {parent_disk_id} before it is defined"
        )));
    };
    let mut field = NewField::new(parent_id, name, type_name)
        .structure(structure)
        .repetitions(n_repetitions)
        .description(description);
    field.type_alias = type_alias;
    field.field_version = field_version;
    field.type_version = type_version;
    builder.add_field(field)?;
    Ok(())
}

/// Adds clusters and cluster groups from the footer; returns the groups in storage order.
pub fn deserialize_footer(
    bytes: &[u8],
    builder: &mut DescriptorBuilder,
    header_checksum: u32,
) -> Result<Vec<ClusterGroupDescriptor>, Error> {
    let mut reader = open_envelope(bytes)?;
    let _feature_flags = reader.read_u64()?;
    let stored = reader.read_u32()?;
    if stored != header_checksum {
        return Err(corrupt(format!(
            "footer expects header checksum {stored:08x} but header has {header_checksum:08x}"
        ))
        .with_hint("Header and footer come from different writes."));
    }
    let _schema_extension = reader.record_frame()?;
    let _column_groups = reader.list_frame()?;

    let (n_clusters, mut summaries) = reader.list_frame()?;
    for cluster_id in 0..DescriptorId::from(n_clusters) {
        let mut record = summaries.record_frame()?;
        let first_entry = record.read_u64()?;
        let n_entries = record.read_u64()?;
        builder.add_cluster(cluster_id, first_entry, n_entries)?;
    }

    let (n_groups, mut records) = reader.list_frame()?;
    let mut groups = Vec::with_capacity(bounded_count(n_groups, &records, 4, "cluster group")?);
    let mut next_cluster: DescriptorId = 0;
    for group_id in 0..DescriptorId::from(n_groups) {
        let mut record = records.record_frame()?;
        let min_entry = record.read_u64()?;
        let entry_span = record.read_u64()?;
        let group_clusters = DescriptorId::from(record.read_u32()?);
        let page_list_length = record.read_u32()?;
        let locator_size = u32::try_from(record.read_i32()?)
            .map_err(|_| corrupt(format!("cluster group {group_id} has a negative locator")))?;
        let locator_offset = record.read_u64()?;

        let end = next_cluster + group_clusters;
        if end > DescriptorId::from(n_clusters) {
            return Err(corrupt(format!(
                "cluster group {group_id} claims {group_clusters} clusters but only {} remain",
                DescriptorId::from(n_clusters) - next_cluster
            )));
        }
        let group = ClusterGroupDescriptor {
            id: group_id,
            min_entry,
            entry_span,
            cluster_ids: (next_cluster..end).collect(),
            page_list_locator: Locator {
                offset: locator_offset,
                size: locator_size,
            },
            page_list_length,
        };
        next_cluster = end;
        builder.add_cluster_group(group.clone())?;
        groups.push(group);
    }
    Ok(groups)
}

/// Adds the page ranges listed in one group's page-list envelope.
pub fn deserialize_page_list(
    bytes: &[u8],
    group: &ClusterGroupDescriptor,
    builder: &mut DescriptorBuilder,
) -> Result<(), Error> {
    let mut reader = open_envelope(bytes)?;
    let (n_clusters, mut clusters) = reader.list_frame()?;
    if n_clusters as usize != group.cluster_ids.len() {
        return Err(corrupt(format!(
            "page list of group {} covers {n_clusters} clusters, footer says {}",
            group.id,
            group.cluster_ids.len()
        )));
    }
    for cluster_id in &group.cluster_ids {
        let (n_columns, mut columns) = clusters.list_frame()?;
        if n_columns as usize != builder.n_columns() {
            return Err(corrupt(format!(
                "cluster {cluster_id} lists {n_columns} columns, header has {}",
                builder.n_columns()
            )));
        }
        for column_id in 0..DescriptorId::from(n_columns) {
            let (n_pages, mut pages) = columns.list_frame()?;
            let n_pages = bounded_count(n_pages, &pages, PAGE_INFO_SIZE, "page")
                .map_err(|err| err.with_column(column_id))?;
            let mut page_infos = Vec::with_capacity(n_pages);
            for _ in 0..n_pages {
                let n_elements = u32::try_from(pages.read_i32()?).map_err(|_| {
                    corrupt("negative page element count").with_column(column_id)
                })?;
                let size = u32::try_from(pages.read_i32()?)
                    .map_err(|_| corrupt("negative page size").with_column(column_id))?;
                let offset = pages.read_u64()?;
                page_infos.push(PageInfo {
                    n_elements,
                    locator: Locator { offset, size },
                });
            }
            let first_element_index = columns.read_i64()?;
            let compression_settings = columns.read_u32()?;
            if first_element_index == ABSENT_COLUMN_MARKER {
                continue;
            }
            let first_element_index = u64::try_from(first_element_index).map_err(|_| {
                corrupt("negative first element index").with_column(column_id)
            })?;
            builder.add_page_range(
                *cluster_id,
                column_id,
                ColumnRange {
                    first_element_index,
                    compression_settings,
                },
                PageRange { page_infos },
            )?;
        }
    }
    Ok(())
}
