use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gpkgswap_engine::{ConsumerRef, ConsumerRegistry, HostProject, RegistryEntity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ProjectLayer {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
    /// Data-source descriptor, e.g. `/data/city.gpkg|layername=roads`.
    #[serde(default)]
    pub(crate) source: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    layers: Vec<ProjectLayer>,
}

/// A project file on disk acting as the host application.
///
/// Removing layers only changes the in-memory copy; `reread` restores the
/// layer list from the file.
#[derive(Debug, Default)]
pub(crate) struct ProjectFileHost {
    path: Option<PathBuf>,
    layers: Vec<ProjectLayer>,
}

impl ProjectFileHost {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let layers = read_project_layers(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            layers,
        })
    }

    /// A host with no saved project and no layers.
    pub(crate) fn unsaved() -> Self {
        Self::default()
    }

    pub(crate) fn layers(&self) -> &[ProjectLayer] {
        &self.layers
    }

    pub(crate) fn layer_name(&self, id: &ConsumerRef) -> Option<&str> {
        self.layers
            .iter()
            .find(|layer| layer.id == id.as_str())
            .map(|layer| layer.name.as_str())
    }
}

fn read_project_layers(path: &Path) -> Result<Vec<ProjectLayer>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read project file: {}", path.display()))?;
    let project: ProjectFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse project file: {}", path.display()))?;
    Ok(project.layers)
}

impl ConsumerRegistry for ProjectFileHost {
    fn entities(&self) -> Vec<RegistryEntity> {
        self.layers
            .iter()
            .map(|layer| RegistryEntity {
                id: ConsumerRef::new(layer.id.clone()),
                descriptor: (!layer.source.trim().is_empty()).then(|| layer.source.clone()),
            })
            .collect()
    }

    /// Relative sources are relative to the directory holding the project file.
    fn source_base(&self) -> Option<PathBuf> {
        let parent = self.path.as_deref()?.parent()?;
        if parent.as_os_str().is_empty() {
            return Some(PathBuf::from("."));
        }
        Some(parent.to_path_buf())
    }

    fn remove_entities(&mut self, refs: &BTreeSet<ConsumerRef>) -> Result<usize> {
        let before = self.layers.len();
        self.layers
            .retain(|layer| !refs.contains(&ConsumerRef::new(layer.id.clone())));
        Ok(before - self.layers.len())
    }
}

impl HostProject for ProjectFileHost {
    fn current_project_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn reread(&mut self, path: &Path) -> bool {
        match read_project_layers(path) {
            Ok(layers) => {
                self.layers = layers;
                self.path = Some(path.to_path_buf());
                true
            }
            Err(err) => {
                tracing::warn!(project = %path.display(), error = %format!("{err:#}"), "project reread failed");
                false
            }
        }
    }
}
