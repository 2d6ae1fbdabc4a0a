use crate::StoreError;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy the contents of `src` into `dst`, merging with whatever
/// `dst` already holds. Files that exist in both are overwritten, so repeated
/// copies into one destination resolve as last-writer-wins.
///
/// Permission bits travel with `fs::copy`; symlinks are recreated, not followed.
/// Returns the number of regular files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64, StoreError> {
    if !src.is_dir() {
        return Err(StoreError::SourceMissing(src.display().to_string()));
    }
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for item in WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = item?;
        let rel = item
            .path()
            .strip_prefix(src)
            .map_err(|e| StoreError::Io(std::io::Error::other(format!("path strip: {e}"))))?;
        let target = dst.join(rel);
        let ft = item.file_type();

        if ft.is_dir() {
            if target.is_symlink() || target.is_file() {
                fs::remove_file(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else if ft.is_symlink() {
            let link = fs::read_link(item.path())?;
            remove_existing(&target)?;
            std::os::unix::fs::symlink(link, &target)?;
        } else if ft.is_file() {
            // Replace rather than write through: the old file may be read-only.
            remove_existing(&target)?;
            fs::copy(item.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn remove_existing(path: &Path) -> Result<(), StoreError> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(_) => {}
    }
    Ok(())
}
