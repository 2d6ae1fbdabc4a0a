use crate::StoreError;
use fnpack_schema::ArchiveFormat;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the run manifest inside the distribution root.
pub const MANIFEST_FILE: &str = "build_manifest.json";
const LOCK_FILE: &str = ".fnpack.lock";

/// Directory layout of a distribution root.
///
/// Every task writes below its own `<name>/<arch>/` directory and to its own
/// `<name>-<arch>.<ext>` archive, so concurrent tasks never contend for a path.
#[derive(Debug, Clone)]
pub struct DistLayout {
    root: PathBuf,
}

impl DistLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-task working directory: `<root>/<name>/<arch>`.
    #[inline]
    pub fn task_dir(&self, name: &str, arch: &str) -> PathBuf {
        self.root.join(name).join(arch)
    }

    /// Where the backend materializes a staged filesystem for a task.
    #[inline]
    pub fn asset_dir(&self, name: &str, arch: &str) -> PathBuf {
        self.task_dir(name, arch).join("asset")
    }

    #[inline]
    pub fn archive_path(&self, name: &str, arch: &str, format: ArchiveFormat) -> PathBuf {
        self.root.join(format!("{name}-{arch}.{}", format.extension()))
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Create a fresh task directory, discarding leftovers from a previous run.
    pub fn prepare_task_dir(&self, name: &str, arch: &str) -> Result<PathBuf, StoreError> {
        let dir = self.task_dir(name, arch);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Render `path` relative to the root when it lives inside it.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}
