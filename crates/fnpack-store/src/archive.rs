use crate::StoreError;
use flate2::{Compression, GzBuilder};
use fnpack_schema::ArchiveFormat;
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Timestamp stamped on every archive entry: 1980-01-01T00:00:00Z, the
/// earliest instant a zip entry can represent.
pub const FIXED_MTIME: u64 = 315_532_800;

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of members written.
    pub entries: usize,
    /// Archive size in bytes.
    pub size: u64,
    /// blake3 hex digest of the archive bytes.
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug)]
struct Entry {
    rel: String,
    path: PathBuf,
    kind: EntryKind,
    mode: u32,
}

/// Pack `source` into a byte-reproducible archive at `dest`.
///
/// Determinism guarantees:
/// - Members ordered by a sorted depth-first walk, independent of readdir order
/// - Every timestamp fixed to [`FIXED_MTIME`], ownership 0:0 in tar
/// - Permission bits preserved from the source
/// - One compression method (DEFLATE) for every member
///
/// Parent directories of `dest` are created; an existing file is replaced
/// atomically.
pub fn export_archive(
    source: &Path,
    dest: &Path,
    format: ArchiveFormat,
) -> Result<ArchiveSummary, StoreError> {
    if !source.is_dir() {
        return Err(StoreError::SourceMissing(source.display().to_string()));
    }
    let entries = collect_entries(source)?;

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    let written = match format {
        ArchiveFormat::Zip => write_zip(&entries, tmp.as_file_mut())?,
        ArchiveFormat::TarGz => write_tar_gz(&entries, tmp.as_file_mut())?,
    };
    tmp.as_file().sync_all()?;

    let bytes = fs::read(tmp.path())?;
    let digest = blake3::hash(&bytes).to_hex().to_string();
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;

    debug!(
        "exported {} entries from {} to {}",
        written,
        source.display(),
        dest.display()
    );
    Ok(ArchiveSummary {
        entries: written,
        size: bytes.len() as u64,
        digest,
    })
}

/// Walk `root` with siblings sorted by file name at every level.
fn collect_entries(root: &Path) -> Result<Vec<Entry>, StoreError> {
    let mut entries = Vec::new();
    for item in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let item = item?;
        let rel = item
            .path()
            .strip_prefix(root)
            .map_err(|e| StoreError::Io(io::Error::other(format!("path strip: {e}"))))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let ft = item.file_type();
        let kind = if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_file() {
            EntryKind::File
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else {
            warn!("skipping unsupported file type: {rel}");
            continue;
        };
        let mode = item.metadata()?.permissions().mode();
        entries.push(Entry {
            rel,
            path: item.into_path(),
            kind,
            mode,
        });
    }
    Ok(entries)
}

fn write_zip(entries: &[Entry], out: &mut File) -> Result<usize, StoreError> {
    let mut zip = ZipWriter::new(out);
    let mut written = 0;
    for entry in entries {
        match entry.kind {
            EntryKind::File => {
                let options = FileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .last_modified_time(DateTime::default())
                    .unix_permissions(entry.mode & 0o7777);
                zip.start_file(entry.rel.as_str(), options)?;
                let mut f = File::open(&entry.path)?;
                io::copy(&mut f, &mut zip)?;
                written += 1;
            }
            // Implied by the file entries below them.
            EntryKind::Dir => {}
            EntryKind::Symlink => {
                warn!("skipping symlink in zip archive: {}", entry.rel);
            }
        }
    }
    zip.finish()?;
    Ok(written)
}

fn write_tar_gz(entries: &[Entry], out: &mut File) -> Result<usize, StoreError> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(out, Compression::default());
    let mut ar = tar::Builder::new(encoder);
    ar.follow_symlinks(false);

    for entry in entries {
        match entry.kind {
            EntryKind::File => {
                let data = fs::read(&entry.path)?;
                let mut header = make_header(entry, tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_cksum();
                ar.append_data(&mut header, &entry.rel, data.as_slice())?;
            }
            EntryKind::Dir => {
                let mut header = make_header(entry, tar::EntryType::Directory);
                header.set_size(0);
                header.set_cksum();
                ar.append_data(&mut header, format!("{}/", entry.rel), io::empty())?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path)?;
                let mut header = make_header(entry, tar::EntryType::Symlink);
                header.set_size(0);
                header.set_cksum();
                ar.append_link(&mut header, &entry.rel, &target)?;
            }
        }
    }

    let encoder = ar.into_inner()?;
    let out = encoder.finish()?;
    out.flush()?;
    Ok(entries.len())
}

fn make_header(entry: &Entry, entry_type: tar::EntryType) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(FIXED_MTIME);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(entry.mode & 0o7777);
    header
}
