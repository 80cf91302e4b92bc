//! Purpose: Define the public Rust API boundary for ntdump.
//! Exports: Dump operations, column enumeration and the error types the binaries need.
//! Role: Public surface used by both binaries and the integration tests.
//! Invariants: Binaries reach storage only through this module.
//! Invariants: Everything here is read-only with respect to the dataset.

mod dumper;
mod template;
mod values;

pub use crate::core::column_type::ColumnType;
pub use crate::core::columns::ColumnInfo;
pub use crate::core::decode::ColumnValue;
pub use crate::core::descriptor::{Descriptor, DescriptorGuard, DescriptorId};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::page_source::{FileSource, PageSource};
pub use dumper::{Dumper, PageDumpOptions, check_output_dir, check_output_file};
pub use template::{DEFAULT_PAGE_TEMPLATE, PageFileTemplate};
pub use values::ColumnValues;
