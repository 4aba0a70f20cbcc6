use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

/// Sentinel used for geometry kinds and spatial references the driver could not report.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCount {
    Known(u64),
    Unknown,
}

impl RecordCount {
    /// Drivers report an unknown count as a negative number.
    pub fn from_driver(raw: i64) -> Self {
        u64::try_from(raw).map_or(Self::Unknown, Self::Known)
    }

    pub fn known(self) -> Option<u64> {
        match self {
            Self::Known(count) => Some(count),
            Self::Unknown => None,
        }
    }

    pub fn as_sentinel(self) -> i64 {
        match self {
            Self::Known(count) => i64::try_from(count).unwrap_or(i64::MAX),
            Self::Unknown => -1,
        }
    }
}

impl fmt::Display for RecordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(count) => write!(f, "{count}"),
            Self::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl Serialize for RecordCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_sentinel())
    }
}

/// Spatial reference details as reported by a driver; any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpatialRef {
    pub authority: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl SpatialRef {
    /// `AUTHORITY:CODE` when both parts are present, else the display name, else `unknown`.
    pub fn identifier(&self) -> String {
        let authority = non_blank(self.authority.as_deref());
        let code = non_blank(self.code.as_deref());
        if let (Some(authority), Some(code)) = (authority, code) {
            return format!("{authority}:{code}");
        }
        non_blank(self.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    pub name: String,
    pub record_count: RecordCount,
    pub geometry_kind: String,
    pub spatial_ref_id: String,
}

/// Layers of one container keyed by name. Built fresh for every inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    layers: BTreeMap<String, LayerEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning any previous entry that had the same name.
    pub fn insert(&mut self, entry: LayerEntry) -> Option<LayerEntry> {
        self.layers.insert(entry.name.clone(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&LayerEntry> {
        self.layers.get(name)
    }

    pub fn contains_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> BTreeSet<&str> {
        self.layers.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerEntry> {
        self.layers.values()
    }

    /// Entries ordered by lower-cased name, the order used for display.
    pub fn sorted_for_display(&self) -> Vec<&LayerEntry> {
        let mut entries = self.layers.values().collect::<Vec<_>>();
        entries.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }
}

impl FromIterator<LayerEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = LayerEntry>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparedLayer {
    #[serde(flatten)]
    pub entry: LayerEntry,
    pub exists_in_origin: bool,
}

/// The new-side catalog marked against the origin's layer names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonView {
    pub origin_known: bool,
    pub layers: Vec<ComparedLayer>,
}

impl ComparisonView {
    /// Without an origin catalog every layer is marked absent and `origin_known` is false.
    pub fn build(new: &Catalog, origin: Option<&Catalog>) -> Self {
        let origin_names = origin.map(Catalog::layer_names).unwrap_or_default();
        let layers = new
            .sorted_for_display()
            .into_iter()
            .map(|entry| ComparedLayer {
                entry: entry.clone(),
                exists_in_origin: origin_names.contains(entry.name.as_str()),
            })
            .collect();
        Self {
            origin_known: origin.is_some(),
            layers,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComparedLayer> {
        self.layers.iter().find(|layer| layer.entry.name == name)
    }

    pub fn new_layer_names(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter(|layer| !layer.exists_in_origin)
            .map(|layer| layer.entry.name.as_str())
            .collect()
    }
}
