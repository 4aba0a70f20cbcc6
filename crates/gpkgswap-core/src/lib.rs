mod catalog;
mod driver;
mod error;
mod input;
mod path;

pub use catalog::{
    Catalog, ComparedLayer, ComparisonView, LayerEntry, RecordCount, SpatialRef, UNKNOWN,
};
pub use driver::{ContainerDriver, ContainerHandle};
pub use error::{ReplaceError, Result};
pub use input::{has_container_extension, InputKind, ARCHIVE_EXTENSION, CONTAINER_EXTENSION};
pub use path::{normalize_lexically, ContainerPath};
