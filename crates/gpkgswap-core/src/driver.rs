use std::path::Path;

use crate::catalog::SpatialRef;

/// Read-only access to container catalogs.
///
/// `open_read_only` returns `None` when the file cannot be opened as a
/// container. Opening must not take locks that block other readers or writers.
pub trait ContainerDriver {
    fn open_read_only(&self, path: &Path) -> Option<Box<dyn ContainerHandle>>;
}

/// An open container. Layers are addressed by index in `0..layer_count()`.
///
/// Each per-layer property is fetched separately so one failing lookup does
/// not hide the others.
pub trait ContainerHandle {
    fn layer_count(&self) -> usize;

    fn layer_name(&self, index: usize) -> anyhow::Result<String>;

    /// Negative when the driver cannot count cheaply.
    fn feature_count(&self, index: usize) -> anyhow::Result<i64>;

    fn geometry_type_name(&self, index: usize) -> anyhow::Result<String>;

    fn spatial_ref(&self, index: usize) -> anyhow::Result<Option<SpatialRef>>;
}
