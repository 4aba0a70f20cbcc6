//! Minimal GeoPackage writer for tests.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct FixtureLayer {
    pub name: String,
    pub features: u64,
    /// `None` writes an attributes table without geometry.
    pub geometry: Option<String>,
    pub srs: Option<FixtureSrs>,
}

#[derive(Debug, Clone)]
pub struct FixtureSrs {
    pub srs_id: i64,
    pub name: String,
    pub organization: String,
    pub organization_coordsys_id: i64,
}

impl FixtureSrs {
    pub fn epsg(code: i64, name: &str) -> Self {
        Self {
            srs_id: code,
            name: name.to_string(),
            organization: "EPSG".to_string(),
            organization_coordsys_id: code,
        }
    }
}

impl FixtureLayer {
    pub fn points(name: &str, features: u64, epsg: i64) -> Self {
        Self {
            name: name.to_string(),
            features,
            geometry: Some("POINT".to_string()),
            srs: Some(FixtureSrs::epsg(epsg, &format!("EPSG {epsg}"))),
        }
    }
}

pub fn write_geopackage(path: &Path, layers: &[FixtureLayer]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut connection = Connection::open(path)
        .with_context(|| format!("failed to create geopackage {}", path.display()))?;
    connection.execute_batch(
        "PRAGMA application_id = 1196444487;
         CREATE TABLE gpkg_spatial_ref_sys (
             srs_name TEXT NOT NULL,
             srs_id INTEGER PRIMARY KEY,
             organization TEXT NOT NULL,
             organization_coordsys_id INTEGER NOT NULL,
             definition TEXT NOT NULL,
             description TEXT
         );
         CREATE TABLE gpkg_contents (
             table_name TEXT NOT NULL PRIMARY KEY,
             data_type TEXT NOT NULL,
             identifier TEXT UNIQUE,
             description TEXT DEFAULT '',
             last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
             min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,
             srs_id INTEGER
         );
         CREATE TABLE gpkg_geometry_columns (
             table_name TEXT NOT NULL,
             column_name TEXT NOT NULL,
             geometry_type_name TEXT NOT NULL,
             srs_id INTEGER NOT NULL,
             z TINYINT NOT NULL,
             m TINYINT NOT NULL,
             CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name)
         );
         INSERT INTO gpkg_spatial_ref_sys VALUES ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL);
         INSERT INTO gpkg_spatial_ref_sys VALUES ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL);",
    )?;

    let tx = connection.transaction()?;
    for layer in layers {
        let srs_id = layer.srs.as_ref().map(|srs| srs.srs_id);
        if let Some(srs) = &layer.srs {
            tx.execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES (?1, ?2, ?3, ?4, 'fixture', NULL)",
                params![
                    srs.name,
                    srs.srs_id,
                    srs.organization,
                    srs.organization_coordsys_id
                ],
            )?;
        }

        let quoted = format!("\"{}\"", layer.name.replace('"', "\"\""));
        let data_type = if layer.geometry.is_some() {
            "features"
        } else {
            "attributes"
        };
        tx.execute_batch(&format!(
            "CREATE TABLE {quoted} (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB, label TEXT)"
        ))?;
        tx.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) VALUES (?1, ?2, ?1, ?3)",
            params![layer.name, data_type, srs_id],
        )?;
        if let Some(geometry) = &layer.geometry {
            tx.execute(
                "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', ?2, ?3, 0, 0)",
                params![layer.name, geometry, srs_id.unwrap_or(-1)],
            )?;
        }

        let insert = format!("INSERT INTO {quoted} (geom, label) VALUES (NULL, ?1)");
        let mut statement = tx.prepare(&insert)?;
        for index in 0..layer.features {
            statement.execute(params![format!("{}-{index}", layer.name)])?;
        }
    }
    tx.commit()?;
    Ok(())
}
