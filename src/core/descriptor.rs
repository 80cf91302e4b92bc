//! Purpose: In-memory structural index of one ntuple: schema tree, columns, clusters, groups.
//! Exports: `Descriptor`, `DescriptorBuilder`, `DescriptorGuard`, and the per-entity descriptors.
//! Role: Read-only view consumed by the resolver, enumerator and metadata serializer.
//! Invariants: Field ids index an arena rooted at field zero (id 0); the tree is acyclic.
//! Invariants: Column physical ids are dense and assigned in creation order.
//! Invariants: Clusters iterate in storage order; every page range names a known column.
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::{RwLock, RwLockReadGuard};

use crate::core::column_type::ColumnType;
use crate::core::error::{Error, ErrorKind};

pub type DescriptorId = u64;

pub const FIELD_ZERO_ID: DescriptorId = 0;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StructureRole {
    #[default]
    Leaf,
    Collection,
    Record,
    Variant,
    Reference,
}

impl StructureRole {
    pub fn to_disk(self) -> u16 {
        match self {
            StructureRole::Leaf => 0,
            StructureRole::Collection => 1,
            StructureRole::Record => 2,
            StructureRole::Variant => 3,
            StructureRole::Reference => 4,
        }
    }

    pub fn from_disk(value: u16) -> Result<Self, Error> {
        match value {
            0 => Ok(StructureRole::Leaf),
            1 => Ok(StructureRole::Collection),
            2 => Ok(StructureRole::Record),
            3 => Ok(StructureRole::Variant),
            4 => Ok(StructureRole::Reference),
            _ => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("invalid field structure role {value}"))),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub id: DescriptorId,
    pub parent_id: Option<DescriptorId>,
    pub field_version: u32,
    pub type_version: u32,
    pub name: String,
    pub type_name: String,
    pub type_alias: String,
    pub description: String,
    pub structure: StructureRole,
    /// Fixed array length; zero for non-repetitive fields.
    pub n_repetitions: u64,
    pub children: Vec<DescriptorId>,
    /// Physical column ids ordered by column index.
    pub columns: Vec<DescriptorId>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnDescriptor {
    pub physical_id: DescriptorId,
    pub field_id: DescriptorId,
    pub index: u32,
    pub column_type: ColumnType,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Locator {
    pub offset: u64,
    /// Bytes on storage, i.e. after compression.
    pub size: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageInfo {
    pub n_elements: u32,
    pub locator: Locator,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageRange {
    pub page_infos: Vec<PageInfo>,
}

impl PageRange {
    pub fn n_elements(&self) -> u64 {
        self.page_infos
            .iter()
            .map(|page| page.n_elements as u64)
            .sum()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnRange {
    /// Index of the first element of this cluster within the whole column.
    pub first_element_index: u64,
    pub compression_settings: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterDescriptor {
    pub id: DescriptorId,
    pub first_entry: u64,
    pub n_entries: u64,
    column_ranges: BTreeMap<DescriptorId, ColumnRange>,
    page_ranges: BTreeMap<DescriptorId, PageRange>,
}

impl ClusterDescriptor {
    pub fn contains_column(&self, column_id: DescriptorId) -> bool {
        self.page_ranges.contains_key(&column_id)
    }

    pub fn page_range(&self, column_id: DescriptorId) -> Option<&PageRange> {
        self.page_ranges.get(&column_id)
    }

    pub fn column_range(&self, column_id: DescriptorId) -> Option<&ColumnRange> {
        self.column_ranges.get(&column_id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterGroupDescriptor {
    pub id: DescriptorId,
    pub min_entry: u64,
    pub entry_span: u64,
    pub cluster_ids: Vec<DescriptorId>,
    pub page_list_locator: Locator,
    /// Uncompressed size of the page-list envelope.
    pub page_list_length: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    name: String,
    description: String,
    writer: String,
    compression_settings: u32,
    fields: Vec<FieldDescriptor>,
    columns: Vec<ColumnDescriptor>,
    clusters: Vec<ClusterDescriptor>,
    cluster_index: HashMap<DescriptorId, usize>,
    cluster_groups: Vec<ClusterGroupDescriptor>,
}

impl Descriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn writer(&self) -> &str {
        &self.writer
    }

    pub fn compression_settings(&self) -> u32 {
        self.compression_settings
    }

    pub fn field_zero_id(&self) -> DescriptorId {
        FIELD_ZERO_ID
    }

    pub fn field(&self, id: DescriptorId) -> Option<&FieldDescriptor> {
        usize::try_from(id).ok().and_then(|idx| self.fields.get(idx))
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Finds a direct child of `parent_id` by name.
    pub fn find_field_id(&self, name: &str, parent_id: DescriptorId) -> Option<DescriptorId> {
        self.field(parent_id)?
            .children
            .iter()
            .copied()
            .find(|child| self.field(*child).is_some_and(|field| field.name == name))
    }

    /// Resolves a dotted path such as `jets.pt` starting at field zero.
    pub fn find_field_id_by_path(&self, path: &str) -> Option<DescriptorId> {
        if path.is_empty() {
            return None;
        }
        path.split('.')
            .try_fold(FIELD_ZERO_ID, |parent, name| self.find_field_id(name, parent))
    }

    pub fn child_fields(&self, field_id: DescriptorId) -> impl Iterator<Item = &FieldDescriptor> {
        self.field(field_id)
            .into_iter()
            .flat_map(|field| field.children.iter())
            .filter_map(move |child| self.field(*child))
    }

    /// Pre-order flattening of the subtree rooted at `root_id`, root first.
    pub fn subtree_fields(&self, root_id: DescriptorId) -> Vec<&FieldDescriptor> {
        let mut out = Vec::new();
        let mut stack: Vec<DescriptorId> = vec![root_id];
        while let Some(id) = stack.pop() {
            let Some(field) = self.field(id) else {
                continue;
            };
            out.push(field);
            stack.extend(field.children.iter().rev().copied());
        }
        out
    }

    pub fn column(&self, physical_id: DescriptorId) -> Option<&ColumnDescriptor> {
        usize::try_from(physical_id)
            .ok()
            .and_then(|idx| self.columns.get(idx))
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Columns of one field in index order.
    pub fn field_columns(&self, field_id: DescriptorId) -> impl Iterator<Item = &ColumnDescriptor> {
        self.field(field_id)
            .into_iter()
            .flat_map(|field| field.columns.iter())
            .filter_map(move |column| self.column(*column))
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterDescriptor> {
        self.clusters.iter()
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, id: DescriptorId) -> Option<&ClusterDescriptor> {
        self.cluster_index.get(&id).map(|idx| &self.clusters[*idx])
    }

    pub fn cluster_groups(&self) -> impl Iterator<Item = &ClusterGroupDescriptor> {
        self.cluster_groups.iter()
    }

    pub fn n_cluster_groups(&self) -> usize {
        self.cluster_groups.len()
    }

    pub fn cluster_group(&self, id: DescriptorId) -> Option<&ClusterGroupDescriptor> {
        self.cluster_groups.iter().find(|group| group.id == id)
    }

    pub fn n_entries(&self) -> u64 {
        self.clusters
            .iter()
            .map(|cluster| cluster.first_entry + cluster.n_entries)
            .max()
            .unwrap_or(0)
    }
}

/// Scoped shared read access to a descriptor; released on drop.
pub struct DescriptorGuard<'a> {
    inner: RwLockReadGuard<'a, Descriptor>,
}

impl<'a> DescriptorGuard<'a> {
    pub fn acquire(lock: &'a RwLock<Descriptor>) -> Result<Self, Error> {
        let inner = lock.read().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("descriptor lock poisoned")
        })?;
        Ok(Self { inner })
    }
}

impl Deref for DescriptorGuard<'_> {
    type Target = Descriptor;

    fn deref(&self) -> &Descriptor {
        &self.inner
    }
}

/// Attributes of a field about to be added to a [`DescriptorBuilder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewField {
    pub parent_id: DescriptorId,
    pub name: String,
    pub type_name: String,
    pub type_alias: String,
    pub description: String,
    pub field_version: u32,
    pub type_version: u32,
    pub structure: StructureRole,
    pub n_repetitions: u64,
}

impl NewField {
    pub fn new(parent_id: DescriptorId, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            parent_id,
            name: name.into(),
            type_name: type_name.into(),
            type_alias: String::new(),
            description: String::new(),
            field_version: 0,
            type_version: 0,
            structure: StructureRole::Leaf,
            n_repetitions: 0,
        }
    }

    pub fn structure(mut self, structure: StructureRole) -> Self {
        self.structure = structure;
        self
    }

    pub fn repetitions(mut self, n_repetitions: u64) -> Self {
        self.n_repetitions = n_repetitions;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Clone, Debug)]
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let zero = FieldDescriptor {
            id: FIELD_ZERO_ID,
            parent_id: None,
            field_version: 0,
            type_version: 0,
            name: String::new(),
            type_name: String::new(),
            type_alias: String::new(),
            description: String::new(),
            structure: StructureRole::Record,
            n_repetitions: 0,
            children: Vec::new(),
            columns: Vec::new(),
        };
        Self {
            descriptor: Descriptor {
                name: name.into(),
                description: String::new(),
                writer: String::new(),
                compression_settings: 0,
                fields: vec![zero],
                columns: Vec::new(),
                clusters: Vec::new(),
                cluster_index: HashMap::new(),
                cluster_groups: Vec::new(),
            },
        }
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn writer(&mut self, writer: impl Into<String>) -> &mut Self {
        self.descriptor.writer = writer.into();
        self
    }

    pub fn compression_settings(&mut self, settings: u32) -> &mut Self {
        self.descriptor.compression_settings = settings;
        self
    }

    pub fn n_fields(&self) -> usize {
        self.descriptor.fields.len()
    }

    pub fn n_columns(&self) -> usize {
        self.descriptor.columns.len()
    }

    pub fn add_field(&mut self, field: NewField) -> Result<DescriptorId, Error> {
        let id = self.descriptor.fields.len() as DescriptorId;
        let parent = usize::try_from(field.parent_id)
            .ok()
            .filter(|idx| *idx < self.descriptor.fields.len())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("parent field {} does not exist", field.parent_id))
            })?;
        self.descriptor.fields[parent].children.push(id);
        self.descriptor.fields.push(FieldDescriptor {
            id,
            parent_id: Some(field.parent_id),
            field_version: field.field_version,
            type_version: field.type_version,
            name: field.name,
            type_name: field.type_name,
            type_alias: field.type_alias,
            description: field.description,
            structure: field.structure,
            n_repetitions: field.n_repetitions,
            children: Vec::new(),
            columns: Vec::new(),
        });
        Ok(id)
    }

    pub fn add_column(
        &mut self,
        field_id: DescriptorId,
        column_type: ColumnType,
    ) -> Result<DescriptorId, Error> {
        if field_id == FIELD_ZERO_ID {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("field zero cannot own columns"));
        }
        let field_idx = usize::try_from(field_id)
            .ok()
            .filter(|idx| *idx < self.descriptor.fields.len())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("field {field_id} does not exist"))
            })?;
        let physical_id = self.descriptor.columns.len() as DescriptorId;
        let field = &mut self.descriptor.fields[field_idx];
        let index = field.columns.len() as u32;
        field.columns.push(physical_id);
        self.descriptor.columns.push(ColumnDescriptor {
            physical_id,
            field_id,
            index,
            column_type,
        });
        Ok(physical_id)
    }

    pub fn add_cluster(
        &mut self,
        id: DescriptorId,
        first_entry: u64,
        n_entries: u64,
    ) -> Result<(), Error> {
        if self.descriptor.cluster_index.contains_key(&id) {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("duplicate cluster id {id}")));
        }
        self.descriptor
            .cluster_index
            .insert(id, self.descriptor.clusters.len());
        self.descriptor.clusters.push(ClusterDescriptor {
            id,
            first_entry,
            n_entries,
            column_ranges: BTreeMap::new(),
            page_ranges: BTreeMap::new(),
        });
        Ok(())
    }

    pub fn add_page_range(
        &mut self,
        cluster_id: DescriptorId,
        column_id: DescriptorId,
        column_range: ColumnRange,
        page_range: PageRange,
    ) -> Result<(), Error> {
        if self.descriptor.column(column_id).is_none() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("page range names an unknown column")
                .with_column(column_id));
        }
        let idx = *self
            .descriptor
            .cluster_index
            .get(&cluster_id)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("cluster {cluster_id} does not exist"))
            })?;
        let cluster = &mut self.descriptor.clusters[idx];
        cluster.column_ranges.insert(column_id, column_range);
        cluster.page_ranges.insert(column_id, page_range);
        Ok(())
    }

    pub fn add_cluster_group(&mut self, group: ClusterGroupDescriptor) -> Result<(), Error> {
        if self.descriptor.cluster_group(group.id).is_some() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("duplicate cluster group id {}", group.id)));
        }
        self.descriptor.cluster_groups.push(group);
        Ok(())
    }

    pub fn build(self) -> Result<Descriptor, Error> {
        let descriptor = self.descriptor;
        for group in &descriptor.cluster_groups {
            for cluster_id in &group.cluster_ids {
                if descriptor.cluster(*cluster_id).is_none() {
                    return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                        "cluster group {} references unknown cluster {cluster_id}",
                        group.id
                    )));
                }
            }
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterGroupDescriptor, ColumnRange, DescriptorBuilder, FIELD_ZERO_ID, Locator,
        NewField, PageInfo, PageRange, StructureRole,
    };
    use crate::core::column_type::ColumnType;
    use crate::core::error::ErrorKind;

    fn page(n_elements: u32, offset: u64) -> PageInfo {
        PageInfo {
            n_elements,
            locator: Locator { offset, size: n_elements * 4 },
        }
    }

    #[test]
    fn fields_resolve_by_name_and_path() {
        let mut builder = DescriptorBuilder::new("events");
        let jets = builder
            .add_field(NewField::new(FIELD_ZERO_ID, "jets", "std::vector<Jet>").structure(StructureRole::Collection))
            .expect("jets");
        let jet = builder.add_field(NewField::new(jets, "_0", "Jet")).expect("_0");
        let pt = builder.add_field(NewField::new(jet, "pt", "float")).expect("pt");
        let desc = builder.build().expect("build");

        assert_eq!(desc.find_field_id("jets", FIELD_ZERO_ID), Some(jets));
        assert_eq!(desc.find_field_id("pt", FIELD_ZERO_ID), None);
        assert_eq!(desc.find_field_id_by_path("jets._0.pt"), Some(pt));
        assert_eq!(desc.find_field_id_by_path("jets.pt"), None);
        assert_eq!(desc.find_field_id_by_path(""), None);
        assert_eq!(desc.field(pt).unwrap().parent_id, Some(jet));
    }

    #[test]
    fn subtree_is_flattened_in_pre_order() {
        let mut builder = DescriptorBuilder::new("events");
        let a = builder.add_field(NewField::new(FIELD_ZERO_ID, "a", "A")).expect("a");
        let b = builder.add_field(NewField::new(FIELD_ZERO_ID, "b", "B")).expect("b");
        let a1 = builder.add_field(NewField::new(a, "a1", "int")).expect("a1");
        let a2 = builder.add_field(NewField::new(a, "a2", "int")).expect("a2");
        let a11 = builder.add_field(NewField::new(a1, "a11", "int")).expect("a11");
        let desc = builder.build().expect("build");

        let order: Vec<_> = desc.subtree_fields(FIELD_ZERO_ID).iter().map(|f| f.id).collect();
        assert_eq!(order, vec![FIELD_ZERO_ID, a, a1, a11, a2, b]);
        let order: Vec<_> = desc.subtree_fields(a1).iter().map(|f| f.id).collect();
        assert_eq!(order, vec![a1, a11]);
    }

    #[test]
    fn columns_get_dense_ids_and_per_field_indices() {
        let mut builder = DescriptorBuilder::new("events");
        let a = builder.add_field(NewField::new(FIELD_ZERO_ID, "a", "std::string")).expect("a");
        let b = builder.add_field(NewField::new(FIELD_ZERO_ID, "b", "float")).expect("b");
        let a0 = builder.add_column(a, ColumnType::Index64).expect("a0");
        let b0 = builder.add_column(b, ColumnType::Real32).expect("b0");
        let a1 = builder.add_column(a, ColumnType::Char).expect("a1");
        let desc = builder.build().expect("build");

        assert_eq!((a0, b0, a1), (0, 1, 2));
        assert_eq!(desc.column(a1).unwrap().index, 1);
        let ids: Vec<_> = desc.field_columns(a).map(|c| c.physical_id).collect();
        assert_eq!(ids, vec![a0, a1]);
    }

    #[test]
    fn field_zero_cannot_own_columns() {
        let mut builder = DescriptorBuilder::new("events");
        let err = builder
            .add_column(FIELD_ZERO_ID, ColumnType::Bit)
            .expect_err("field zero");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn clusters_keep_storage_order_and_page_ranges() {
        let mut builder = DescriptorBuilder::new("events");
        let x = builder.add_field(NewField::new(FIELD_ZERO_ID, "x", "float")).expect("x");
        let col = builder.add_column(x, ColumnType::Real32).expect("col");
        builder.add_cluster(7, 0, 10).expect("c7");
        builder.add_cluster(3, 10, 5).expect("c3");
        let range = PageRange {
            page_infos: vec![page(6, 32), page(4, 56)],
        };
        builder
            .add_page_range(
                7,
                col,
                ColumnRange {
                    first_element_index: 0,
                    compression_settings: 0,
                },
                range,
            )
            .expect("range");
        builder
            .add_cluster_group(ClusterGroupDescriptor {
                id: 0,
                min_entry: 0,
                entry_span: 15,
                cluster_ids: vec![7, 3],
                page_list_locator: Locator::default(),
                page_list_length: 0,
            })
            .expect("group");
        let desc = builder.build().expect("build");

        let ids: Vec<_> = desc.clusters().map(|c| c.id).collect();
        assert_eq!(ids, vec![7, 3]);
        assert!(desc.cluster(7).unwrap().contains_column(col));
        assert!(!desc.cluster(3).unwrap().contains_column(col));
        assert_eq!(desc.cluster(7).unwrap().page_range(col).unwrap().n_elements(), 10);
        assert_eq!(desc.n_entries(), 15);
    }

    #[test]
    fn group_with_unknown_cluster_is_corrupt() {
        let mut builder = DescriptorBuilder::new("events");
        builder
            .add_cluster_group(ClusterGroupDescriptor {
                id: 0,
                min_entry: 0,
                entry_span: 0,
                cluster_ids: vec![42],
                page_list_locator: Locator::default(),
                page_list_length: 0,
            })
            .expect("group");
        let err = builder.build().expect_err("unknown cluster");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
