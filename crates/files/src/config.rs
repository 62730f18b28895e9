//! Storage-area configuration.
//!
//! The storage-area table is resolved once at process startup and then passed into the
//! storer. Nothing in this crate reads environment variables or configuration files on its
//! own; the helpers below only parse values the caller has already fetched.

use crate::{FilesError, FilesResult, StorageArea};
use docstore_naming::PathMapper;
use docstore_types::StorageId;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One storage area as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageAreaConfig {
    pub id: StorageId,
    pub root: PathBuf,
    /// Digits per shard directory; defaults to three.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_width: Option<usize>,
}

impl StorageAreaConfig {
    pub fn into_area(self) -> FilesResult<StorageArea> {
        let mapper = match self.group_width {
            Some(width) => PathMapper::new(width).map_err(|e| {
                FilesError::InvalidConfig(format!("storage area {}: {}", self.id, e))
            })?,
            None => PathMapper::default(),
        };
        Ok(StorageArea::with_mapper(self.id, self.root, mapper))
    }
}

/// Configuration file layout: `{"default_area": 1, "areas": [{"id": 1, "root": "..."}]}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreConfigFile {
    pub default_area: StorageId,
    pub areas: Vec<StorageAreaConfig>,
}

/// The table of configured storage areas, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StorageAreas {
    areas: BTreeMap<StorageId, StorageArea>,
}

impl StorageAreas {
    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidConfig`] for duplicate ids or empty root paths.
    pub fn new(areas: impl IntoIterator<Item = StorageArea>) -> FilesResult<Self> {
        let mut table = BTreeMap::new();
        for area in areas {
            if area.root().as_os_str().is_empty() {
                return Err(FilesError::InvalidConfig(format!(
                    "storage area {} has an empty root path",
                    area.id()
                )));
            }
            if let Some(previous) = table.insert(area.id(), area) {
                return Err(FilesError::InvalidConfig(format!(
                    "storage area {} is configured more than once",
                    previous.id()
                )));
            }
        }
        Ok(Self { areas: table })
    }

    pub fn from_configs(configs: impl IntoIterator<Item = StorageAreaConfig>) -> FilesResult<Self> {
        let areas = configs
            .into_iter()
            .map(StorageAreaConfig::into_area)
            .collect::<FilesResult<Vec<_>>>()?;
        Self::new(areas)
    }

    /// Looks up an area.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::UnknownStorageArea`] if `id` is not configured.
    pub fn get(&self, id: StorageId) -> FilesResult<&StorageArea> {
        self.areas
            .get(&id)
            .ok_or(FilesError::UnknownStorageArea(id))
    }

    pub fn contains(&self, id: StorageId) -> bool {
        self.areas.contains_key(&id)
    }

    /// Areas in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageArea> {
        self.areas.values()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// Storage configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    areas: StorageAreas,
    default_area: StorageId,
}

impl StoreConfig {
    /// Create a new `StoreConfig`. `default_area` must be one of `areas`.
    pub fn new(areas: StorageAreas, default_area: StorageId) -> FilesResult<Self> {
        if !areas.contains(default_area) {
            return Err(FilesError::InvalidConfig(format!(
                "default storage area {} is not configured",
                default_area
            )));
        }
        Ok(Self {
            areas,
            default_area,
        })
    }

    pub fn from_file_config(file: StoreConfigFile) -> FilesResult<Self> {
        Self::new(StorageAreas::from_configs(file.areas)?, file.default_area)
    }

    /// Parses the JSON layout described by [`StoreConfigFile`].
    pub fn from_json(text: &str) -> FilesResult<Self> {
        let file: StoreConfigFile = serde_json::from_str(text)
            .map_err(|e| FilesError::InvalidConfig(format!("malformed JSON: {}", e)))?;
        Self::from_file_config(file)
    }

    pub fn areas(&self) -> &StorageAreas {
        &self.areas
    }

    /// Area used when the caller has no assignment of its own (new documents).
    pub fn default_area(&self) -> StorageId {
        self.default_area
    }
}

/// Parse the storage-area table from an optional `id=path[,id=path...]` value.
///
/// Whitespace around entries is ignored. A missing or blank value is an error: the engine
/// cannot run without at least one storage area.
pub fn storage_areas_from_env_value(value: Option<String>) -> FilesResult<StorageAreas> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FilesError::InvalidConfig("no storage areas configured".into()))?;

    let mut areas = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, root) = entry.split_once('=').ok_or_else(|| {
            FilesError::InvalidConfig(format!("expected id=path, got '{}'", entry))
        })?;
        let id: StorageId = id.parse()?;
        areas.push(StorageArea::new(id, PathBuf::from(root.trim())));
    }
    StorageAreas::new(areas)
}

/// Parse the default storage area from an optional value.
///
/// If `value` is `None` or blank, returns the lowest configured id.
pub fn default_area_from_env_value(
    value: Option<String>,
    areas: &StorageAreas,
) -> FilesResult<StorageId> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        Some(v) => Ok(v.parse()?),
        None => areas
            .iter()
            .next()
            .map(StorageArea::id)
            .ok_or_else(|| FilesError::InvalidConfig("no storage areas configured".into())),
    }
}
