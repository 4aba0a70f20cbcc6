use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use gpkgswap_core::{has_container_extension, InputKind, ReplaceError, Result};
use zip::ZipArchive;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Turns a user-selected input into a container path.
///
/// A `.gpkg` input is returned as-is. A `.zip` input has its first non-directory
/// `.gpkg` entry (in archive order) extracted into a fresh scratch directory
/// under `scratch_root`. Scratch directories are left in place.
pub fn resolve_input(input: &Path, scratch_root: &Path) -> Result<PathBuf> {
    match InputKind::infer_from_path(input) {
        Some(InputKind::Container) => Ok(input.to_path_buf()),
        Some(InputKind::Archive) => extract_first_container(input, scratch_root),
        None => Err(ReplaceError::UnsupportedInputFormat {
            input: input.to_path_buf(),
        }),
    }
}

/// Creates a new directory under `root` unique to this process and call.
pub fn make_scratch_dir(root: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let dir = root.join(format!(
        "extract-{}-{}-{}",
        std::process::id(),
        nanos,
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir(&dir)?;
    Ok(dir)
}

fn extract_first_container(archive_path: &Path, scratch_root: &Path) -> Result<PathBuf> {
    let file = File::open(archive_path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            ReplaceError::NotFound {
                path: archive_path.to_path_buf(),
            }
        } else {
            archive_error(archive_path, "failed to open archive", Some(err))
        }
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| archive_error(archive_path, &format!("not a zip archive: {err}"), None))?;

    let index = first_container_index(&mut archive, archive_path)?.ok_or_else(|| {
        ReplaceError::NoContainerInArchive {
            archive: archive_path.to_path_buf(),
        }
    })?;

    let mut entry = archive
        .by_index(index)
        .map_err(|err| archive_error(archive_path, &format!("failed to read entry: {err}"), None))?;
    let relative = entry.enclosed_name().ok_or_else(|| {
        archive_error(
            archive_path,
            &format!("entry '{}' escapes the archive root", entry.name()),
            None,
        )
    })?;

    let scratch = make_scratch_dir(scratch_root).map_err(|err| {
        archive_error(archive_path, "failed to create scratch directory", Some(err))
    })?;
    let target = scratch.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            archive_error(archive_path, "failed to create extraction directory", Some(err))
        })?;
    }
    let mut out = File::create(&target)
        .map_err(|err| archive_error(archive_path, "failed to create extracted file", Some(err)))?;
    io::copy(&mut entry, &mut out)
        .map_err(|err| archive_error(archive_path, "failed to extract container", Some(err)))?;

    tracing::debug!(
        archive = %archive_path.display(),
        extracted = %target.display(),
        "container extracted from archive"
    );
    Ok(target)
}

fn first_container_index(
    archive: &mut ZipArchive<File>,
    archive_path: &Path,
) -> Result<Option<usize>> {
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|err| {
            archive_error(archive_path, &format!("failed to list entry {index}: {err}"), None)
        })?;
        if !entry.is_dir() && !entry.name().ends_with('/') && has_container_extension(entry.name())
        {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn archive_error(archive: &Path, message: &str, source: Option<io::Error>) -> ReplaceError {
    ReplaceError::ArchiveRead {
        archive: archive.to_path_buf(),
        message: message.to_string(),
        source,
    }
}
