//! Purpose: Centralize container and envelope format versioning.
//! Exports: `CONTAINER_VERSION`, `ENVELOPE_VERSION`, `ANCHOR_VERSION_*`, version error helpers.
//! Role: Shared policy for gating on-disk compatibility across the container and metadata readers.
//! Invariants: Readers accept any envelope whose minimum version does not exceed ours.
//! Invariants: Version lists are additive; bump only for incompatible on-disk changes.

use crate::core::error::{Error, ErrorKind};

pub const CONTAINER_VERSION: u32 = 1;
pub const SUPPORTED_CONTAINER_VERSIONS: &[u32] = &[CONTAINER_VERSION];

pub const ENVELOPE_VERSION: u16 = 1;
pub const ENVELOPE_MIN_VERSION: u16 = 1;

pub const ANCHOR_VERSION_EPOCH: u16 = 0;
pub const ANCHOR_VERSION_MAJOR: u16 = 2;

pub fn container_version_error(detected: u32) -> Error {
    let supported = SUPPORTED_CONTAINER_VERSIONS
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::new(ErrorKind::Corrupt)
        .with_message(format!(
            "unsupported container format version {detected} (supported: {supported})"
        ))
        .with_hint("The file was written by a newer writer; upgrade ntdump to inspect it.")
}

pub fn envelope_version_error(min_version: u16) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(format!(
            "metadata envelope requires reader version {min_version} (have {ENVELOPE_VERSION})"
        ))
        .with_hint("The metadata was written by a newer writer; upgrade ntdump to inspect it.")
}

pub fn anchor_epoch_error(epoch: u16) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!(
        "unsupported anchor epoch {epoch} (expected {ANCHOR_VERSION_EPOCH})"
    ))
}
