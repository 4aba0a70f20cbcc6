use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use gpkgswap_core::{ReplaceError, Result};

use crate::fs_utils::{copy_with_metadata, remove_file_if_exists, sha256_file_hex};
use crate::layout::{backups_dir_for, parent_dir};
use crate::types::BackupRecord;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const BACKUP_SUFFIX: &str = ".bak";

/// `{base}.{YYYYMMDD_HHMMSS}.bak`
pub fn backup_file_name(base_name: &str, created_at: &DateTime<Local>) -> String {
    format!(
        "{base_name}.{}{BACKUP_SUFFIX}",
        created_at.format(BACKUP_TIMESTAMP_FORMAT)
    )
}

/// Backs up `source`'s destination, then copies `source` over it.
pub fn backup_and_swap(
    source: &Path,
    destination: &Path,
    backup_dir_name: &str,
) -> Result<Option<BackupRecord>> {
    let backup = create_backup(destination, backup_dir_name)?;
    copy_over(source, destination)?;
    Ok(backup)
}

pub fn create_backup(destination: &Path, backup_dir_name: &str) -> Result<Option<BackupRecord>> {
    create_backup_at(destination, backup_dir_name, Local::now())
}

/// Ensures the destination directory exists and, when a file is already at
/// `destination`, copies it into the sibling backup directory.
///
/// Returns `None` when there was nothing to back up. The backup is verified
/// by digest before returning; on any failure the destination is untouched.
pub fn create_backup_at(
    destination: &Path,
    backup_dir_name: &str,
    now: DateTime<Local>,
) -> Result<Option<BackupRecord>> {
    let dest_dir = parent_dir(destination);
    fs::create_dir_all(&dest_dir).map_err(|err| {
        ReplaceError::backup_failed(
            destination,
            format!("failed to create {}", dest_dir.display()),
            Some(err),
        )
    })?;

    if !destination.exists() {
        return Ok(None);
    }

    let base_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ReplaceError::backup_failed(destination, "destination has no file name", None)
        })?;

    let backups_dir = backups_dir_for(destination, backup_dir_name);
    fs::create_dir_all(&backups_dir).map_err(|err| {
        ReplaceError::backup_failed(
            destination,
            format!("failed to create {}", backups_dir.display()),
            Some(err),
        )
    })?;

    let backup_path = unique_backup_path(&backups_dir, &base_name, &now);
    if let Err(err) = copy_with_metadata(destination, &backup_path) {
        let _ = remove_file_if_exists(&backup_path);
        return Err(ReplaceError::backup_failed(
            destination,
            format!("failed to copy to {}", backup_path.display()),
            Some(err),
        ));
    }

    let sha256 = verify_backup(destination, &backup_path).inspect_err(|_| {
        let _ = remove_file_if_exists(&backup_path);
    })?;

    tracing::info!(
        destination = %destination.display(),
        backup = %backup_path.display(),
        "backup created"
    );
    Ok(Some(BackupRecord {
        path: backup_path,
        created_at: now,
        sha256: Some(sha256),
    }))
}

fn unique_backup_path(backups_dir: &Path, base_name: &str, now: &DateTime<Local>) -> PathBuf {
    let first = backups_dir.join(backup_file_name(base_name, now));
    if !first.exists() {
        return first;
    }
    let stamp = now.format(BACKUP_TIMESTAMP_FORMAT);
    (2_u32..)
        .map(|n| backups_dir.join(format!("{base_name}.{stamp}_{n}{BACKUP_SUFFIX}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn verify_backup(destination: &Path, backup_path: &Path) -> Result<String> {
    let digest = |path: &Path| {
        sha256_file_hex(path).map_err(|err| {
            ReplaceError::backup_failed(
                destination,
                format!("failed to hash {}", path.display()),
                Some(err),
            )
        })
    };
    let expected = digest(destination)?;
    let actual = digest(backup_path)?;
    if expected != actual {
        return Err(ReplaceError::backup_failed(
            destination,
            format!(
                "backup digest mismatch for {}: expected {expected}, got {actual}",
                backup_path.display()
            ),
            None,
        ));
    }
    Ok(actual)
}

/// Copies `source` to a staging file beside `destination` and renames it into
/// place, so `destination` holds either the old bytes or the new ones.
///
/// On failure any backup taken earlier is left on disk.
pub fn copy_over(source: &Path, destination: &Path) -> Result<()> {
    let copy_failed = |err: io::Error| ReplaceError::CopyFailed {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: err,
    };

    let staging = staging_path_for(destination);
    remove_file_if_exists(&staging).map_err(copy_failed)?;

    if let Err(err) = copy_with_metadata(source, &staging) {
        let _ = remove_file_if_exists(&staging);
        return Err(copy_failed(err));
    }
    if let Err(err) = fs::rename(&staging, destination) {
        let _ = remove_file_if_exists(&staging);
        return Err(copy_failed(err));
    }

    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        "container copied into place"
    );
    Ok(())
}

fn staging_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    parent_dir(destination).join(format!(".{name}.gpkgswap-staging"))
}

/// Backups of `destination`, newest first. Files whose names do not carry a
/// backup timestamp are ignored.
pub fn list_backups(destination: &Path, backup_dir_name: &str) -> anyhow::Result<Vec<BackupRecord>> {
    let backups_dir = backups_dir_for(destination, backup_dir_name);
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    let Some(base_name) = destination.file_name().map(|name| name.to_string_lossy().into_owned())
    else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for entry in fs::read_dir(&backups_dir)
        .with_context(|| format!("failed to read backup directory: {}", backups_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(created_at) = parse_backup_timestamp(&file_name, &base_name) else {
            continue;
        };
        records.push(BackupRecord {
            path: entry.path(),
            created_at,
            sha256: None,
        });
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.path.cmp(&a.path)));
    Ok(records)
}

fn parse_backup_timestamp(file_name: &str, base_name: &str) -> Option<DateTime<Local>> {
    let rest = file_name.strip_prefix(base_name)?.strip_prefix('.')?;
    let stamp = rest.strip_suffix(BACKUP_SUFFIX)?;
    // Drop the collision counter, if any: `YYYYMMDD_HHMMSS_N`.
    let (stamp, counter) = (stamp.get(..15)?, stamp.get(15..)?);
    if !counter.is_empty() && !counter.starts_with('_') {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}
