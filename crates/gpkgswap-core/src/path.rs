use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Component, Path, PathBuf};

/// An absolute, lexically normalized container location.
///
/// Equality and hashing use a lower-cased rendering of the normalized path,
/// so `/a/b/X.gpkg` and `/a/./b/x.GPKG` name the same container.
#[derive(Debug, Clone)]
pub struct ContainerPath {
    path: PathBuf,
    key: String,
}

impl ContainerPath {
    /// Resolves `raw` against the current working directory when relative.
    pub fn new(raw: impl AsRef<Path>) -> io::Result<Self> {
        let raw = raw.as_ref();
        if raw.is_absolute() {
            return Ok(Self::from_absolute(raw));
        }
        let base = std::env::current_dir()?;
        Ok(Self::with_base(raw, &base))
    }

    pub fn with_base(raw: impl AsRef<Path>, base: &Path) -> Self {
        let raw = raw.as_ref();
        if raw.is_absolute() {
            Self::from_absolute(raw)
        } else {
            Self::from_absolute(&base.join(raw))
        }
    }

    fn from_absolute(path: &Path) -> Self {
        let path = normalize_lexically(path);
        let key = path.to_string_lossy().to_lowercase();
        Self { path, key }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn same_container(&self, other: &Self) -> bool {
        self.key == other.key
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl PartialEq for ContainerPath {
    fn eq(&self, other: &Self) -> bool {
        self.same_container(other)
    }
}

impl Eq for ContainerPath {}

impl Hash for ContainerPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ContainerPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContainerPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl AsRef<Path> for ContainerPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Removes `.` segments and folds `..` into its parent without touching the
/// file system. `..` above the root is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}
