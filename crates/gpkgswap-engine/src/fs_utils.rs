use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn sha256_file_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Copies bytes and permissions, then carries the source modification time over.
pub fn copy_with_metadata(from: &Path, to: &Path) -> io::Result<u64> {
    let bytes = fs::copy(from, to)?;
    let modified = fs::metadata(from)?.modified()?;
    match OpenOptions::new().write(true).open(to) {
        Ok(file) => {
            file.set_modified(modified)?;
            file.sync_all()?;
        }
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            set_modified_read_only(to, modified)?;
        }
        Err(err) => return Err(err),
    }
    Ok(bytes)
}

/// Unix lets the owner set times through a read-only handle.
#[cfg(not(windows))]
fn set_modified_read_only(path: &Path, modified: SystemTime) -> io::Result<()> {
    let file = File::open(path)?;
    file.set_modified(modified)?;
    file.sync_all()
}

/// Windows needs write access to set times, so the read-only attribute is
/// lifted for the update and restored afterwards.
#[cfg(windows)]
fn set_modified_read_only(path: &Path, modified: SystemTime) -> io::Result<()> {
    let original = fs::metadata(path)?.permissions();
    let mut writable = original.clone();
    #[allow(clippy::permissions_set_readonly_false)]
    writable.set_readonly(false);
    fs::set_permissions(path, writable)?;

    let updated = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| {
            file.set_modified(modified)?;
            file.sync_all()
        });
    fs::set_permissions(path, original)?;
    updated
}
