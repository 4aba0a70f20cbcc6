use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Result;
use gpkgswap_core::ContainerPath;
use regex::Regex;

use crate::types::ConsumerRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntity {
    pub id: ConsumerRef,
    /// `None` when the host could not report the entity's data source.
    pub descriptor: Option<String>,
}

/// The host's registry of loaded layers.
pub trait ConsumerRegistry {
    fn entities(&self) -> Vec<RegistryEntity>;

    /// Directory that relative data sources are resolved against; `None`
    /// falls back to the process working directory.
    fn source_base(&self) -> Option<PathBuf> {
        None
    }

    /// Removes the given entities in one call and returns how many were removed.
    /// Unknown ids are skipped; an error means the registry call itself failed.
    fn remove_entities(&mut self, refs: &BTreeSet<ConsumerRef>) -> Result<usize>;
}

/// Descriptor shapes tried in order; the first that yields a path wins.
#[derive(Debug, Clone, Copy)]
enum DescriptorShape {
    /// `dbname='/path/to/x.gpkg' table="roads" ...`
    QuotedDbName,
    /// `/path/to/x.gpkg|layername=roads`
    EmbeddedContainerPath,
}

const DESCRIPTOR_SHAPES: [DescriptorShape; 2] = [
    DescriptorShape::QuotedDbName,
    DescriptorShape::EmbeddedContainerPath,
];

impl DescriptorShape {
    fn extract(self, descriptor: &str) -> Option<String> {
        match self {
            Self::QuotedDbName => {
                let marker = "dbname='";
                let start = descriptor.find(marker)? + marker.len();
                let end = start + descriptor[start..].find('\'')?;
                (end > start).then(|| descriptor[start..end].to_string())
            }
            Self::EmbeddedContainerPath => embedded_path_pattern()
                .captures(descriptor)
                .and_then(|captures| captures.get(1))
                .map(|found| found.as_str().to_string()),
        }
    }
}

fn embedded_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(.+?\.gpkg)").expect("descriptor pattern is valid"))
}

/// Extracts the container path from a host data-source descriptor.
pub fn container_path_from_descriptor(descriptor: &str) -> Option<String> {
    if descriptor.trim().is_empty() {
        return None;
    }
    DESCRIPTOR_SHAPES
        .iter()
        .find_map(|shape| shape.extract(descriptor))
}

fn entity_container(entity: &RegistryEntity, base: &std::path::Path) -> Option<ContainerPath> {
    let descriptor = entity.descriptor.as_deref()?;
    let raw = container_path_from_descriptor(descriptor)?;
    Some(ContainerPath::with_base(raw, base))
}

fn current_dir_or_dot() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn resolution_base<R>(registry: &R) -> PathBuf
where
    R: ConsumerRegistry + ?Sized,
{
    registry.source_base().unwrap_or_else(current_dir_or_dot)
}

/// Every registry entity whose data source is `container`.
pub fn find_consumers<R>(registry: &R, container: &ContainerPath) -> BTreeSet<ConsumerRef>
where
    R: ConsumerRegistry + ?Sized,
{
    let base = resolution_base(registry);
    registry
        .entities()
        .into_iter()
        .filter(|entity| {
            entity_container(entity, &base).is_some_and(|path| path.same_container(container))
        })
        .map(|entity| entity.id)
        .collect()
}

/// Removes `refs` from the registry; `Ok(false)` when nothing was removed.
pub fn detach_consumers<R>(registry: &mut R, refs: &BTreeSet<ConsumerRef>) -> Result<bool>
where
    R: ConsumerRegistry + ?Sized,
{
    if refs.is_empty() {
        return Ok(false);
    }
    let removed = registry.remove_entities(refs)?;
    if removed < refs.len() {
        tracing::warn!(
            requested = refs.len(),
            removed,
            "some consumers were not removed from the registry"
        );
    }
    Ok(removed > 0)
}

/// Distinct containers referenced by the registry that exist on disk, sorted.
pub fn collect_origins<R>(registry: &R) -> Vec<ContainerPath>
where
    R: ConsumerRegistry + ?Sized,
{
    let base = resolution_base(registry);
    registry
        .entities()
        .iter()
        .filter_map(|entity| entity_container(entity, &base))
        .filter(ContainerPath::exists)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
