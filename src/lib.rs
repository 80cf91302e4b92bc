//! Purpose: Shared library crate behind the `ntdump-column-data` and `ntdump-pages` binaries.
//! Exports: `api` (dump operations), `core` (format, descriptor, page path), `diagnostics`.
//! Role: Read-only inspection engine for columnar ntuple container files.
//! Invariants: Nothing in this crate writes to or locks a dataset exclusively.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod diagnostics;
