use std::path::Path;

pub const CONTAINER_EXTENSION: &str = "gpkg";
pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Container,
    Archive,
}

impl InputKind {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "gpkg" => Some(Self::Container),
            "zip" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Classifies an input by its file name; matching is case-insensitive.
    pub fn infer_from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if has_container_extension(&file_name) {
            return Some(Self::Container);
        }
        if file_name.ends_with(&format!(".{ARCHIVE_EXTENSION}")) {
            return Some(Self::Archive);
        }
        None
    }
}

pub fn has_container_extension(name: &str) -> bool {
    name.to_ascii_lowercase()
        .ends_with(&format!(".{CONTAINER_EXTENSION}"))
}
