use crate::layout::DistLayout;
use crate::StoreError;
use fnpack_schema::TargetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::info;

/// One artifact produced by a completed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    /// Archive path (relative to the dist root when inside it) or image tag.
    pub path: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ArtifactRecord {
    pub fn new(name: impl Into<String>, kind: TargetKind, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    pub fn platform(&self) -> Option<&str> {
        self.metadata.get("platform").map(String::as_str)
    }
}

/// Serialized shape of `build_manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildManifest {
    pub artifacts: Vec<ArtifactRecord>,
}

impl BuildManifest {
    pub fn read_from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Collects records from concurrent tasks and writes them once.
///
/// `add` may be called from any number of worker threads; `save` serializes
/// the collected records and refuses to run a second time.
pub struct ManifestAggregator {
    layout: DistLayout,
    records: Mutex<Vec<ArtifactRecord>>,
    saved: AtomicBool,
}

impl ManifestAggregator {
    pub fn new(layout: DistLayout) -> Self {
        Self {
            layout,
            records: Mutex::new(Vec::new()),
            saved: AtomicBool::new(false),
        }
    }

    pub fn add(&self, record: ArtifactRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        records.push(record);
        Ok(())
    }

    /// Record an archive, rendering its path relative to the dist root.
    pub fn add_archive(
        &self,
        name: &str,
        kind: TargetKind,
        archive: &Path,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut record = ArtifactRecord::new(name, kind, self.layout.display_path(archive));
        record.metadata = metadata;
        self.add(record)
    }

    /// Copy of the records collected so far, in the order `save` writes them.
    pub fn snapshot(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let mut sorted = records.clone();
        sort_records(&mut sorted);
        Ok(sorted)
    }

    /// Write `build_manifest.json` under the dist root. Callable once.
    pub fn save(&self) -> Result<PathBuf, StoreError> {
        if self.saved.swap(true, Ordering::SeqCst) {
            return Err(StoreError::ManifestAlreadySaved(
                self.layout.root().display().to_string(),
            ));
        }

        let manifest = BuildManifest {
            artifacts: self.snapshot()?,
        };
        let content = serde_json::to_string_pretty(&manifest)?;

        self.layout.initialize()?;
        let dest = self.layout.manifest_path();
        let mut tmp = NamedTempFile::new_in(self.layout.root())?;
        tmp.write_all(content.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;

        info!(
            "manifest with {} artifacts saved to {}",
            manifest.artifacts.len(),
            dest.display()
        );
        Ok(dest)
    }
}

// Completion order of concurrent tasks is arbitrary; the file should not be.
fn sort_records(records: &mut [ArtifactRecord]) {
    records.sort_by(|a, b| {
        (a.name.as_str(), a.kind, a.platform()).cmp(&(b.name.as_str(), b.kind, b.platform()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(name: &str, platform: &str) -> ArtifactRecord {
        ArtifactRecord::new(name, TargetKind::Function, format!("{name}.zip"))
            .with_meta("platform", platform)
    }

    #[test]
    fn save_writes_sorted_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ManifestAggregator::new(DistLayout::new(dir.path()));
        agg.add(record("web", "linux/amd64")).unwrap();
        agg.add(record("api", "linux/arm64")).unwrap();
        agg.add(record("api", "linux/amd64")).unwrap();

        let path = agg.save().unwrap();
        let manifest = BuildManifest::read_from_file(&path).unwrap();
        let order: Vec<_> = manifest
            .artifacts
            .iter()
            .map(|r| (r.name.as_str(), r.platform().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("api", "linux/amd64"),
                ("api", "linux/arm64"),
                ("web", "linux/amd64")
            ]
        );
    }

    #[test]
    fn json_shape_uses_type_key() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ManifestAggregator::new(DistLayout::new(dir.path()));
        agg.add(ArtifactRecord::new("shared", TargetKind::Layer, "shared-amd64.zip"))
            .unwrap();
        let path = agg.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let first = &raw["artifacts"][0];
        assert_eq!(first["name"], "shared");
        assert_eq!(first["type"], "layer");
        assert_eq!(first["path"], "shared-amd64.zip");
        assert!(first["metadata"].is_object());
    }

    #[test]
    fn second_save_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ManifestAggregator::new(DistLayout::new(dir.path()));
        agg.save().unwrap();
        assert!(matches!(
            agg.save().unwrap_err(),
            StoreError::ManifestAlreadySaved(_)
        ));
    }

    #[test]
    fn empty_manifest_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ManifestAggregator::new(DistLayout::new(dir.path().join("dist")));
        let path = agg.save().unwrap();
        let manifest = BuildManifest::read_from_file(&path).unwrap();
        assert!(manifest.artifacts.is_empty());
    }

    #[test]
    fn archive_paths_are_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DistLayout::new(dir.path());
        let agg = ManifestAggregator::new(layout.clone());
        let archive = layout.archive_path("api", "amd64", fnpack_schema::ArchiveFormat::Zip);
        agg.add_archive("api", TargetKind::Function, &archive, BTreeMap::new())
            .unwrap();
        assert_eq!(agg.snapshot().unwrap()[0].path, "api-amd64.zip");
    }

    #[test]
    fn concurrent_adds_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let agg = Arc::new(ManifestAggregator::new(DistLayout::new(dir.path())));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        agg.add(record(&format!("fn-{t}-{i}"), "linux/amd64"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(agg.snapshot().unwrap().len(), 400);
        let path = agg.save().unwrap();
        let manifest = BuildManifest::read_from_file(&path).unwrap();
        assert_eq!(manifest.artifacts.len(), 400);
    }
}
