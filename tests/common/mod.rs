// Writes small but real container files for the integration tests.
#![allow(dead_code)]
use std::path::Path;

use ntdump::core::anchor::{Anchor, CONTAINER_HEADER_SIZE, ContainerHeader, Directory};
use ntdump::core::column_type::{ColumnType, Packing};
use ntdump::core::compression::compress;
use ntdump::core::descriptor::{
    ClusterGroupDescriptor, ColumnRange, Descriptor, DescriptorBuilder, DescriptorId,
    FIELD_ZERO_ID, Locator, NewField, PageInfo, PageRange, StructureRole,
};
use ntdump::core::serialize::MetadataSession;

/// Plain little-endian elements of one page; bit columns use one byte per element.
#[derive(Clone, Debug)]
pub struct PageData {
    pub n_elements: u32,
    pub plain: Vec<u8>,
}

pub fn u32_page(values: &[u32]) -> PageData {
    page(values.len(), values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

pub fn u64_page(values: &[u64]) -> PageData {
    page(values.len(), values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

pub fn i16_page(values: &[i16]) -> PageData {
    page(values.len(), values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

pub fn i64_page(values: &[i64]) -> PageData {
    page(values.len(), values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

pub fn f32_page(values: &[f32]) -> PageData {
    page(values.len(), values.iter().flat_map(|v| v.to_le_bytes()).collect())
}

pub fn bit_page(values: &[bool]) -> PageData {
    page(values.len(), values.iter().map(|v| u8::from(*v)).collect())
}

pub fn char_page(text: &str) -> PageData {
    page(text.len(), text.as_bytes().to_vec())
}

fn page(n: usize, plain: Vec<u8>) -> PageData {
    PageData {
        n_elements: n as u32,
        plain,
    }
}

/// Applies the on-disk packing of `column_type` to plain elements.
pub fn pack(data: &PageData, column_type: ColumnType) -> Vec<u8> {
    let n = data.n_elements as usize;
    let width = column_type.element_size();
    match column_type.packing() {
        Packing::Plain => data.plain.clone(),
        Packing::Split => split(&data.plain, n, width),
        Packing::SplitDelta => {
            let mut prev = 0u64;
            let mut deltas = Vec::with_capacity(data.plain.len());
            for chunk in data.plain.chunks_exact(width) {
                let v = read_le(chunk);
                deltas.extend_from_slice(&v.wrapping_sub(prev).to_le_bytes()[..width]);
                prev = v;
            }
            split(&deltas, n, width)
        }
        Packing::SplitZigzag => {
            let bits = (width * 8) as u32;
            let mut encoded = Vec::with_capacity(data.plain.len());
            for chunk in data.plain.chunks_exact(width) {
                let v = sign_extend(read_le(chunk), bits);
                let z = ((v << 1) ^ (v >> 63)) as u64;
                encoded.extend_from_slice(&z.to_le_bytes()[..width]);
            }
            split(&encoded, n, width)
        }
        Packing::Bits => {
            let mut out = vec![0u8; n.div_ceil(8)];
            for (i, bit) in data.plain.iter().enumerate() {
                if *bit != 0 {
                    out[i / 8] |= 1 << (i % 8);
                }
            }
            out
        }
    }
}

fn split(plain: &[u8], n: usize, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; plain.len()];
    for i in 0..n {
        for b in 0..width {
            out[b * n + i] = plain[i * width + b];
        }
    }
    out
}

fn read_le(chunk: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw[..chunk.len()].copy_from_slice(chunk);
    u64::from_le_bytes(raw)
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

struct ClusterSpec {
    n_entries: u64,
    columns: Vec<(DescriptorId, Vec<PageData>)>,
}

pub struct FileBuilder {
    name: String,
    schema: DescriptorBuilder,
    clusters: Vec<ClusterSpec>,
    group_sizes: Vec<usize>,
    settings: u32,
    compress_metadata: bool,
}

impl FileBuilder {
    pub fn new(name: &str) -> Self {
        let mut schema = DescriptorBuilder::new(name);
        schema.writer("ntdump tests");
        Self {
            name: name.to_string(),
            schema,
            clusters: Vec::new(),
            group_sizes: Vec::new(),
            settings: 0,
            compress_metadata: false,
        }
    }

    pub fn schema(&mut self) -> &mut DescriptorBuilder {
        &mut self.schema
    }

    pub fn compression(&mut self, settings: u32) -> &mut Self {
        self.settings = settings;
        self.schema.compression_settings(settings);
        self
    }

    pub fn compress_metadata(&mut self) -> &mut Self {
        self.compress_metadata = true;
        self
    }

    pub fn cluster(
        &mut self,
        n_entries: u64,
        columns: Vec<(DescriptorId, Vec<PageData>)>,
    ) -> &mut Self {
        self.clusters.push(ClusterSpec { n_entries, columns });
        self
    }

    /// Consecutive clusters per group; one group for everything when never called.
    pub fn groups(&mut self, sizes: &[usize]) -> &mut Self {
        self.group_sizes = sizes.to_vec();
        self
    }

    pub fn write(&self, path: &Path) -> Descriptor {
        let mut file = vec![0u8; CONTAINER_HEADER_SIZE];
        let mut builder = self.schema.clone();
        let mut first_entry = 0u64;
        let mut first_elements: Vec<u64> = vec![0; builder.n_columns()];
        let mut cluster_entries = Vec::new();
        let layout = self.schema.clone().build().expect("schema");

        for (cluster_id, spec) in self.clusters.iter().enumerate() {
            let cluster_id = cluster_id as DescriptorId;
            builder
                .add_cluster(cluster_id, first_entry, spec.n_entries)
                .expect("cluster");
            cluster_entries.push((first_entry, spec.n_entries));
            first_entry += spec.n_entries;

            for (column_id, pages) in &spec.columns {
                let column_type = layout.column(*column_id).expect("column").column_type;
                let mut page_infos = Vec::new();
                for data in pages {
                    let sealed = compress(&pack(data, column_type), self.settings).expect("seal");
                    let offset = file.len() as u64;
                    file.extend_from_slice(&sealed);
                    page_infos.push(PageInfo {
                        n_elements: data.n_elements,
                        locator: Locator {
                            offset,
                            size: sealed.len() as u32,
                        },
                    });
                }
                let range = PageRange { page_infos };
                let slot = &mut first_elements[*column_id as usize];
                let column_range = ColumnRange {
                    first_element_index: *slot,
                    compression_settings: self.settings,
                };
                *slot += range.n_elements();
                builder
                    .add_page_range(cluster_id, *column_id, column_range, range)
                    .expect("page range");
            }
        }

        let sizes = if self.group_sizes.is_empty() {
            vec![self.clusters.len()]
        } else {
            self.group_sizes.clone()
        };
        let groups = |locators: &[(Locator, u32)]| {
            let mut next = 0usize;
            sizes
                .iter()
                .enumerate()
                .map(|(id, size)| {
                    let ids: Vec<DescriptorId> =
                        (next..next + size).map(|c| c as DescriptorId).collect();
                    let min_entry = cluster_entries.get(next).map(|c| c.0).unwrap_or(0);
                    let entry_span = cluster_entries[next..next + size]
                        .iter()
                        .map(|c| c.1)
                        .sum();
                    next += size;
                    let (locator, length) = locators.get(id).copied().unwrap_or_default();
                    ClusterGroupDescriptor {
                        id: id as DescriptorId,
                        min_entry,
                        entry_span,
                        cluster_ids: ids,
                        page_list_locator: locator,
                        page_list_length: length,
                    }
                })
                .collect::<Vec<_>>()
        };

        // Page lists do not depend on their own locators; the footer does.
        let mut draft = builder.clone();
        for group in groups(&[]) {
            draft.add_cluster_group(group).expect("group");
        }
        let draft = draft.build().expect("draft");
        let (mut session, header) = MetadataSession::begin(&draft).expect("header");
        let (seek_header, nbytes_header) = self.append_block(&mut file, &header);
        let mut locators = Vec::new();
        for group in draft.cluster_groups() {
            let page_list = session.page_list(group).expect("page list");
            let (offset, size) = self.append_block(&mut file, &page_list);
            locators.push((
                Locator {
                    offset,
                    size: size as u32,
                },
                page_list.len() as u32,
            ));
        }

        let mut last = builder;
        for group in groups(&locators) {
            last.add_cluster_group(group).expect("group");
        }
        let descriptor = last.build().expect("descriptor");
        let (mut session, _) = MetadataSession::begin(&descriptor).expect("header");
        for group in descriptor.cluster_groups() {
            session.page_list(group).expect("page list");
        }
        let footer = session.footer().expect("footer");
        let (seek_footer, nbytes_footer) = self.append_block(&mut file, &footer);

        let mut directory = Directory::default();
        directory.insert("decoy", Anchor::default());
        directory.insert(
            self.name.clone(),
            Anchor {
                seek_header,
                nbytes_header,
                len_header: header.len() as u64,
                seek_footer,
                nbytes_footer,
                len_footer: footer.len() as u64,
            },
        );
        let directory = directory.encode().expect("directory");
        let container = ContainerHeader {
            directory_offset: file.len() as u64,
            directory_len: directory.len() as u64,
        };
        file.extend_from_slice(&directory);
        file[..CONTAINER_HEADER_SIZE].copy_from_slice(&container.encode());
        std::fs::write(path, &file).expect("write fixture");
        descriptor
    }

    fn append_block(&self, file: &mut Vec<u8>, block: &[u8]) -> (u64, u64) {
        let stored = if self.compress_metadata {
            compress(block, 505).expect("compress metadata")
        } else {
            block.to_vec()
        };
        let offset = file.len() as u64;
        file.extend_from_slice(&stored);
        (offset, stored.len() as u64)
    }
}

pub struct Events {
    pub path: std::path::PathBuf,
    pub descriptor: Descriptor,
    pub px: DescriptorId,
    pub jets_offsets: DescriptorId,
    pub jet_pt: DescriptorId,
    pub flags: DescriptorId,
    pub label: DescriptorId,
    pub charge: DescriptorId,
    pub selector: DescriptorId,
    pub energy: DescriptorId,
}

/// `events`: px (f32), jets (vector of {pt}), flags (bool), label (char), charge (i16),
/// selector (switch), energy (i64). Three clusters in two groups, zstd pages, compressed metadata.
pub fn write_events(dir: &Path) -> Events {
    let mut fb = FileBuilder::new("events");
    fb.compression(505).compress_metadata().groups(&[2, 1]);
    let schema = fb.schema();
    let px_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "px", "float"))
        .expect("px");
    let jets_field = schema
        .add_field(
            NewField::new(FIELD_ZERO_ID, "jets", "std::vector<Jet>")
                .structure(StructureRole::Collection),
        )
        .expect("jets");
    let jet_field = schema
        .add_field(NewField::new(jets_field, "_0", "Jet").structure(StructureRole::Record))
        .expect("_0");
    let pt_field = schema
        .add_field(NewField::new(jet_field, "pt", "float"))
        .expect("pt");
    let flags_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "flags", "bool"))
        .expect("flags");
    let label_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "label", "char"))
        .expect("label");
    let charge_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "charge", "std::int16_t"))
        .expect("charge");
    let selector_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "selector", "std::variant<int,float>"))
        .expect("selector");
    let energy_field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "energy", "std::int64_t"))
        .expect("energy");

    let px = schema.add_column(px_field, ColumnType::SplitReal32).expect("px");
    let jets_offsets = schema
        .add_column(jets_field, ColumnType::SplitIndex64)
        .expect("jets");
    let jet_pt = schema.add_column(pt_field, ColumnType::Real32).expect("pt");
    let flags = schema.add_column(flags_field, ColumnType::Bit).expect("flags");
    let label = schema.add_column(label_field, ColumnType::Char).expect("label");
    let charge = schema
        .add_column(charge_field, ColumnType::SplitInt16)
        .expect("charge");
    let selector = schema
        .add_column(selector_field, ColumnType::Switch)
        .expect("selector");
    let energy = schema
        .add_column(energy_field, ColumnType::SplitInt64)
        .expect("energy");

    let switch_page = PageData {
        n_elements: 1,
        plain: vec![0; 12],
    };
    fb.cluster(
        3,
        vec![
            (px, vec![f32_page(&[1.5, -2.0]), f32_page(&[3.25])]),
            (jets_offsets, vec![u64_page(&[2, 2, 3])]),
            (jet_pt, vec![f32_page(&[10.0, 20.0, 30.0])]),
            (flags, vec![bit_page(&[true, false, true])]),
            (label, vec![char_page("abc")]),
            (charge, vec![i16_page(&[-1, 0, 1])]),
            (selector, vec![switch_page.clone()]),
            (energy, vec![i64_page(&[i64::MIN, -1, 0])]),
        ],
    );
    fb.cluster(
        2,
        vec![
            (px, vec![f32_page(&[4.0, 5.5])]),
            (jets_offsets, vec![u64_page(&[0, 1])]),
            (jet_pt, vec![f32_page(&[40.0])]),
            (flags, vec![bit_page(&[false, false])]),
            (label, vec![char_page("de")]),
            (charge, vec![i16_page(&[-300, 300])]),
            (energy, vec![i64_page(&[i64::MAX, 42])]),
        ],
    );
    fb.cluster(
        1,
        vec![
            (px, vec![f32_page(&[6.0])]),
            (jets_offsets, vec![u64_page(&[0])]),
            (flags, vec![bit_page(&[true])]),
            (label, vec![char_page("f")]),
            (charge, vec![i16_page(&[7])]),
            (selector, vec![switch_page]),
            (energy, vec![i64_page(&[-7])]),
        ],
    );

    let path = dir.join("events.ntpk");
    let descriptor = fb.write(&path);
    Events {
        path,
        descriptor,
        px,
        jets_offsets,
        jet_pt,
        flags,
        label,
        charge,
        selector,
        energy,
    }
}

/// `numbers`: one uncompressed plain u32 column `n` holding 1 and 2.
pub fn write_numbers(dir: &Path) -> std::path::PathBuf {
    let mut fb = FileBuilder::new("numbers");
    let schema = fb.schema();
    let field = schema
        .add_field(NewField::new(FIELD_ZERO_ID, "n", "std::uint32_t"))
        .expect("n");
    let column = schema.add_column(field, ColumnType::UInt32).expect("column");
    fb.cluster(2, vec![(column, vec![u32_page(&[1, 2])])]);
    let path = dir.join("numbers.ntpk");
    fb.write(&path);
    path
}
