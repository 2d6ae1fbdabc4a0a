use crate::planner::BuildTarget;
use crate::recipe::{layer_dir, layer_requirements_file, REQUIREMENTS_FILE, SOURCE_DIR};
use fnpack_store::copy_tree;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("{role} not found: {path}")]
    MissingInput { role: String, path: String },
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("staging copy failed: {0}")]
    Copy(#[from] fnpack_store::StoreError),
}

/// A disposable build context for one task.
///
/// Inputs are mapped to fixed relative paths the recipe refers to. The
/// directory is removed when the context is dropped.
#[derive(Debug)]
pub struct StagingContext {
    dir: TempDir,
}

impl StagingContext {
    /// Populate a fresh context for `target`.
    pub fn assemble(target: &BuildTarget) -> Result<Self, StagingError> {
        let dir = tempfile::Builder::new().prefix("fnpack-stage-").tempdir()?;
        let root = dir.path();
        debug!("staging {} in {}", target.name, root.display());

        copy_dir("source", &target.path, &root.join(SOURCE_DIR))?;
        if let Some(req) = &target.requirements {
            copy_file("requirements", req, &root.join(REQUIREMENTS_FILE))?;
        }

        for layer in &target.layers {
            copy_dir(
                &format!("layer '{}' source", layer.name),
                &layer.path,
                &root.join(layer_dir(&layer.name)),
            )?;
            if let Some(req) = &layer.requirements {
                copy_file(
                    &format!("layer '{}' requirements", layer.name),
                    req,
                    &root.join(layer_requirements_file(&layer.name)),
                )?;
            }
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn copy_dir(role: &str, src: &Path, dst: &Path) -> Result<(), StagingError> {
    if !src.is_dir() {
        return Err(StagingError::MissingInput {
            role: role.to_owned(),
            path: src.display().to_string(),
        });
    }
    copy_tree(src, dst)?;
    Ok(())
}

fn copy_file(role: &str, src: &Path, dst: &Path) -> Result<(), StagingError> {
    if !src.is_file() {
        return Err(StagingError::MissingInput {
            role: role.to_owned(),
            path: src.display().to_string(),
        });
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(())
}
