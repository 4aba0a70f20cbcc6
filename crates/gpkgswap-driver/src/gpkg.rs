use std::path::Path;

use anyhow::{anyhow, Context, Result};
use gpkgswap_core::{ContainerDriver, ContainerHandle, SpatialRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::geometry::display_geometry_type;

/// Reads GeoPackage catalogs through SQLite, read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpkgDriver;

impl ContainerDriver for GpkgDriver {
    fn open_read_only(&self, path: &Path) -> Option<Box<dyn ContainerHandle>> {
        match GpkgHandle::open(path) {
            Ok(handle) => Some(Box::new(handle)),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "geopackage open failed");
                None
            }
        }
    }
}

#[derive(Debug)]
struct ContentsRow {
    table_name: String,
    data_type: String,
    srs_id: Option<i64>,
}

#[derive(Debug)]
pub struct GpkgHandle {
    connection: Connection,
    layers: Vec<ContentsRow>,
}

impl GpkgHandle {
    /// Opens without write access or create so a file held open by another
    /// process is left alone.
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open {} read-only", path.display()))?;

        let layers = read_contents(&connection)
            .with_context(|| format!("{} is not a readable geopackage", path.display()))?;
        Ok(Self { connection, layers })
    }

    fn layer(&self, index: usize) -> Result<&ContentsRow> {
        self.layers
            .get(index)
            .ok_or_else(|| anyhow!("layer index {index} out of range ({})", self.layers.len()))
    }

    fn geometry_column(&self, table_name: &str) -> Result<Option<(String, Option<i64>, i64, i64)>> {
        self.connection
            .query_row(
                "SELECT geometry_type_name, srs_id, z, m FROM gpkg_geometry_columns WHERE table_name = ?1",
                params![table_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .with_context(|| format!("failed to read geometry column for '{table_name}'"))
    }
}

fn read_contents(connection: &Connection) -> Result<Vec<ContentsRow>> {
    let mut statement = connection.prepare(
        "SELECT table_name, data_type, srs_id FROM gpkg_contents \
         WHERE lower(data_type) IN ('features', 'attributes') ORDER BY rowid",
    )?;
    let rows = statement
        .query_map([], |row| {
            Ok(ContentsRow {
                table_name: row.get(0)?,
                data_type: row.get(1)?,
                srs_id: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ContainerHandle for GpkgHandle {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_name(&self, index: usize) -> Result<String> {
        Ok(self.layer(index)?.table_name.clone())
    }

    fn feature_count(&self, index: usize) -> Result<i64> {
        let layer = self.layer(index)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&layer.table_name));
        self.connection
            .query_row(&sql, [], |row| row.get(0))
            .with_context(|| format!("failed to count features in '{}'", layer.table_name))
    }

    fn geometry_type_name(&self, index: usize) -> Result<String> {
        let layer = self.layer(index)?;
        if layer.data_type.eq_ignore_ascii_case("attributes") {
            return Ok("None".to_string());
        }
        let (type_name, _, z, m) = self
            .geometry_column(&layer.table_name)?
            .ok_or_else(|| anyhow!("no geometry column registered for '{}'", layer.table_name))?;
        Ok(display_geometry_type(&type_name, z, m))
    }

    fn spatial_ref(&self, index: usize) -> Result<Option<SpatialRef>> {
        let layer = self.layer(index)?;
        if layer.data_type.eq_ignore_ascii_case("attributes") {
            return Ok(None);
        }
        let column_srs = self
            .geometry_column(&layer.table_name)?
            .and_then(|(_, srs_id, _, _)| srs_id);
        let Some(srs_id) = column_srs.or(layer.srs_id) else {
            return Ok(None);
        };
        // -1 and 0 are the undefined cartesian and geographic systems.
        if srs_id == -1 || srs_id == 0 {
            return Ok(None);
        }

        let row: Option<(Option<String>, Option<String>, Option<i64>)> = self
            .connection
            .query_row(
                "SELECT srs_name, organization, organization_coordsys_id \
                 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
                params![srs_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .with_context(|| format!("failed to read spatial reference {srs_id}"))?;
        let Some((name, organization, coordsys_id)) = row else {
            return Err(anyhow!(
                "spatial reference {srs_id} of '{}' is not registered",
                layer.table_name
            ));
        };

        Ok(Some(SpatialRef {
            authority: organization.filter(|org| !org.eq_ignore_ascii_case("none")),
            code: coordsys_id.filter(|code| *code > 0).map(|code| code.to_string()),
            name,
        }))
    }
}
