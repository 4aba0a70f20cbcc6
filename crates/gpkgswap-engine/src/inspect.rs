use std::path::Path;

use gpkgswap_core::{
    Catalog, ContainerDriver, ContainerHandle, LayerEntry, RecordCount, ReplaceError, Result,
    UNKNOWN,
};

/// Builds a fresh catalog of `path` through `driver` without modifying the file.
///
/// Per-layer count, geometry kind and spatial reference are read independently;
/// a failed lookup degrades that one field to its sentinel. Only a missing file,
/// a container the driver cannot open, or an unreadable layer name fail the call.
pub fn inspect_container(driver: &dyn ContainerDriver, path: &Path) -> Result<Catalog> {
    if !path.exists() {
        return Err(ReplaceError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let handle = driver
        .open_read_only(path)
        .ok_or_else(|| ReplaceError::unreadable(path))?;

    let mut catalog = Catalog::new();
    for index in 0..handle.layer_count() {
        let entry = inspect_layer(handle.as_ref(), index).map_err(|err| {
            ReplaceError::UnreadableContainer {
                path: path.to_path_buf(),
                source: Some(err.into()),
            }
        })?;
        if let Some(previous) = catalog.insert(entry) {
            tracing::warn!(
                path = %path.display(),
                layer = %previous.name,
                "driver reported a duplicate layer name; keeping the later entry"
            );
        }
    }

    tracing::debug!(path = %path.display(), layers = catalog.len(), "container inspected");
    Ok(catalog)
}

fn inspect_layer(handle: &dyn ContainerHandle, index: usize) -> anyhow::Result<LayerEntry> {
    let name = handle.layer_name(index)?;

    let record_count = match handle.feature_count(index) {
        Ok(raw) => RecordCount::from_driver(raw),
        Err(err) => {
            tracing::debug!(layer = %name, error = %err, "feature count unavailable");
            RecordCount::Unknown
        }
    };

    let geometry_kind = match handle.geometry_type_name(index) {
        Ok(kind) if !kind.trim().is_empty() => kind,
        Ok(_) => UNKNOWN.to_string(),
        Err(err) => {
            tracing::debug!(layer = %name, error = %err, "geometry type unavailable");
            UNKNOWN.to_string()
        }
    };

    let spatial_ref_id = match handle.spatial_ref(index) {
        Ok(Some(spatial_ref)) => spatial_ref.identifier(),
        Ok(None) => UNKNOWN.to_string(),
        Err(err) => {
            tracing::debug!(layer = %name, error = %err, "spatial reference unavailable");
            UNKNOWN.to_string()
        }
    };

    Ok(LayerEntry {
        name,
        record_count,
        geometry_kind,
        spatial_ref_id,
    })
}
