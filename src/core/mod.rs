// Core modules: on-disk format, descriptor view, page path and metadata re-serialization.
pub mod anchor;
pub mod column_type;
pub mod columns;
pub mod compression;
pub mod decode;
pub mod descriptor;
pub mod deserialize;
pub mod error;
pub mod format;
pub mod page_source;
pub mod serialize;
pub mod unseal;
pub mod wire;
