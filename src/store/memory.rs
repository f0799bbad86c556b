//! In-memory store

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::table::DatasetTable;
use crate::types::{HierarchyEdge, RegionRecord};

use super::{ChunkStore, Store};

/// Store keeping everything in memory
///
/// Used by tests and by applications that assemble their data in process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, DatasetTable>>,
    chunks: RwLock<BTreeMap<String, DatasetTable>>,
    regions: RwLock<Option<(Vec<RegionRecord>, Vec<HierarchyEdge>)>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given regions and edges
    pub fn with_regions(records: Vec<RegionRecord>, edges: Vec<HierarchyEdge>) -> Self {
        let store = Self::new();
        *store.regions.write() = Some((records, edges));
        store
    }

    /// Number of chunks held
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }
}

impl Store for MemoryStore {
    fn load_table(&self, name: &str) -> Result<DatasetTable> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()).into())
    }

    fn save_table(&self, name: &str, table: &DatasetTable) -> Result<()> {
        self.tables.write().insert(name.to_string(), table.clone());
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().keys().cloned().collect())
    }

    fn load_regions(&self) -> Result<(Vec<RegionRecord>, Vec<HierarchyEdge>)> {
        self.regions
            .read()
            .clone()
            .ok_or_else(|| StoreError::MissingRegions("memory store".to_string()).into())
    }

    fn save_regions(&self, records: &[RegionRecord], edges: &[HierarchyEdge]) -> Result<()> {
        *self.regions.write() = Some((records.to_vec(), edges.to_vec()));
        Ok(())
    }
}

impl ChunkStore for MemoryStore {
    fn list_chunks(&self, table: &str) -> Result<Vec<String>> {
        let prefix = format!("{}-", table);
        Ok(self
            .chunks
            .read()
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn load_chunk(&self, name: &str) -> Result<DatasetTable> {
        self.chunks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()).into())
    }

    fn save_chunk(&self, name: &str, table: &DatasetTable) -> Result<()> {
        self.chunks.write().insert(name.to_string(), table.clone());
        Ok(())
    }
}
