//! Output side of an fnpack run: distribution layout, archives, and the build manifest.
//!
//! This crate provides `DistLayout` for the fixed directory structure under a
//! distribution root, the deterministic archiver (`export_archive`) that turns a
//! staged filesystem into byte-reproducible zip or tar.gz files, and
//! `ManifestAggregator`, the thread-safe collector that writes
//! `build_manifest.json` exactly once per run. `copy_tree` is the merge-copy
//! used to assemble staging contexts and staged filesystems.

pub mod archive;
pub mod fsutil;
pub mod layout;
pub mod manifest;

pub use archive::{export_archive, ArchiveSummary, FIXED_MTIME};
pub use fsutil::copy_tree;
pub use layout::{DistLayout, MANIFEST_FILE};
pub use manifest::{ArtifactRecord, BuildManifest, ManifestAggregator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive source is not a directory: {0}")]
    SourceMissing(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("manifest for {0} has already been saved")]
    ManifestAlreadySaved(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}
