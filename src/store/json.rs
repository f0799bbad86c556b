//! JSON directory store
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/
//! ├── databases/<table>.json    canonical tables
//! ├── chunks/<chunk>.json       staged partial tables
//! ├── regions.json              region records
//! └── region_m2m.json           auxiliary hierarchy edges
//! ```
//!
//! Writes go to a temporary file first and are renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::table::DatasetTable;
use crate::types::{HierarchyEdge, RegionRecord};

use super::{ChunkStore, Store};

const TABLES_DIR: &str = "databases";
const CHUNKS_DIR: &str = "chunks";
const REGIONS_FILE: &str = "regions.json";
const EDGES_FILE: &str = "region_m2m.json";

/// Store backed by JSON files in a directory
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TABLES_DIR)).map_err(StoreError::from)?;
        fs::create_dir_all(root.join(CHUNKS_DIR)).map_err(StoreError::from)?;
        Ok(Self { root })
    }

    /// Data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(TABLES_DIR).join(format!("{}.json", name)))
    }

    fn chunk_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(CHUNKS_DIR).join(format!("{}.json", name)))
    }

    fn json_names(&self, dir: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join(dir)).map_err(StoreError::from)? {
            let path = entry.map_err(StoreError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reject names that would escape the data directory
fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.contains('\0')
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(StoreError::InvalidChunkName(name.to_string()).into());
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(StoreError::from)?;
    Ok(serde_json::from_str(&contents).map_err(StoreError::from)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(StoreError::from)?;
    fs::rename(&tmp, path).map_err(StoreError::from)?;
    debug!(path = %path.display(), "Wrote JSON document");
    Ok(())
}

impl Store for JsonDirStore {
    fn load_table(&self, name: &str) -> Result<DatasetTable> {
        let path = self.table_path(name)?;
        if !path.exists() {
            return Err(StoreError::TableNotFound(name.to_string()).into());
        }
        read_json(&path)
    }

    fn save_table(&self, name: &str, table: &DatasetTable) -> Result<()> {
        write_json(&self.table_path(name)?, table)
    }

    fn table_names(&self) -> Result<Vec<String>> {
        self.json_names(TABLES_DIR)
    }

    fn load_regions(&self) -> Result<(Vec<RegionRecord>, Vec<HierarchyEdge>)> {
        let regions = self.root.join(REGIONS_FILE);
        if !regions.exists() {
            return Err(StoreError::MissingRegions(regions.display().to_string()).into());
        }
        let records = read_json(&regions)?;
        let edges_path = self.root.join(EDGES_FILE);
        let edges = if edges_path.exists() {
            read_json(&edges_path)?
        } else {
            Vec::new()
        };
        Ok((records, edges))
    }

    fn save_regions(&self, records: &[RegionRecord], edges: &[HierarchyEdge]) -> Result<()> {
        write_json(&self.root.join(REGIONS_FILE), &records)?;
        write_json(&self.root.join(EDGES_FILE), &edges)
    }
}

impl ChunkStore for JsonDirStore {
    fn list_chunks(&self, table: &str) -> Result<Vec<String>> {
        let prefix = format!("{}-", table);
        Ok(self
            .json_names(CHUNKS_DIR)?
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }

    fn load_chunk(&self, name: &str) -> Result<DatasetTable> {
        let path = self.chunk_path(name)?;
        if !path.exists() {
            return Err(StoreError::TableNotFound(name.to_string()).into());
        }
        read_json(&path)
    }

    fn save_chunk(&self, name: &str, table: &DatasetTable) -> Result<()> {
        write_json(&self.chunk_path(name)?, table)
    }
}
