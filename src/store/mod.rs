//! Storage and raw data source interfaces
//!
//! The core reads and writes through three small traits:
//!
//! - [`Store`]: canonical dataset tables and the region snapshot
//! - [`ChunkStore`]: partial tables awaiting collection
//! - [`RawDataSource`]: producers of raw tables (remote APIs, files)
//!
//! Two backends are provided: [`MemoryStore`] for tests and embedding, and
//! [`JsonDirStore`] which keeps one JSON document per table under a data
//! directory. Data-source plumbing is composed from the free functions
//! [`read_table`] and [`stage_source`] rather than inherited.

pub mod json;
pub mod memory;

pub use json::JsonDirStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{Error, Result, SourceError};
use crate::region::{RegionStore, RegionStoreBuilder};
use crate::table::{assign_defaults, validate_schema, DatasetTable, SchemaRegistry, TableSchema};
use crate::types::{HierarchyEdge, RegionRecord};

// ============================================================================
// Traits
// ============================================================================

/// Persistent home of canonical tables and region data
pub trait Store: Send + Sync {
    /// Load a canonical table
    fn load_table(&self, name: &str) -> Result<DatasetTable>;

    /// Save (replace) a canonical table
    fn save_table(&self, name: &str, table: &DatasetTable) -> Result<()>;

    /// Names of the stored tables, sorted
    fn table_names(&self) -> Result<Vec<String>>;

    /// Raw region records and auxiliary edges
    fn load_regions(&self) -> Result<(Vec<RegionRecord>, Vec<HierarchyEdge>)>;

    /// Replace the region records and auxiliary edges
    fn save_regions(&self, records: &[RegionRecord], edges: &[HierarchyEdge]) -> Result<()>;

    /// Build a fresh, immutable region snapshot from the stored records
    fn populate_region_store(&self, repair_levels: bool) -> Result<RegionStore> {
        let (records, edges) = self.load_regions()?;
        RegionStoreBuilder::new()
            .records(records)
            .edges(edges)
            .repair_levels(repair_levels)
            .build()
    }
}

/// Storage of partial tables ("chunks")
///
/// Chunk names follow `<table>-[<suffix>-]<scope>`. Listing matches on the
/// `<table>-` prefix, which is why dataset names may not contain `-`.
pub trait ChunkStore: Send + Sync {
    /// Names of every chunk belonging to `table`, sorted
    fn list_chunks(&self, table: &str) -> Result<Vec<String>>;

    /// Load one chunk
    fn load_chunk(&self, name: &str) -> Result<DatasetTable>;

    /// Save (replace) one chunk
    fn save_chunk(&self, name: &str, table: &DatasetTable) -> Result<()>;
}

/// Producer of raw tables
///
/// Every returned table must already be keyed by region id (plus secondary
/// key where its schema declares one). Failures are opaque to the core.
pub trait RawDataSource: Send + Sync {
    /// Source name used in logs
    fn name(&self) -> &str;

    /// Produce raw tables keyed by table name
    fn collect(&self) -> std::result::Result<BTreeMap<String, DatasetTable>, SourceError>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Chunk name for a table produced under `scope`
pub fn chunk_name(table: &str, suffix: Option<&str>, scope: &str) -> String {
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{}-{}-{}", table, suffix, scope),
        None => format!("{}-{}", table, scope),
    }
}

/// Load a canonical table and check it against its schema
pub fn read_table(store: &dyn Store, schema: &TableSchema) -> Result<DatasetTable> {
    let table = store.load_table(&schema.name)?;
    validate_schema(schema, table)
}

/// Run a raw data source and stage its tables as chunks
///
/// Every produced table gets its schema defaults, is validated, and is saved
/// as chunk `<table>-[<suffix>-]<scope>`. Returns the chunk names written.
pub fn stage_source(
    source: &dyn RawDataSource,
    schemas: &SchemaRegistry,
    chunks: &dyn ChunkStore,
    scope: &str,
    suffix: Option<&str>,
) -> Result<Vec<String>> {
    let tables = source.collect()?;
    debug!(source = source.name(), tables = tables.len(), "Raw data collected");

    let mut staged = Vec::with_capacity(tables.len());
    for (name, table) in tables {
        let schema = schemas.get(&name).ok_or_else(|| {
            Error::Configuration(format!(
                "source '{}' produced table '{}' with no declared schema",
                source.name(),
                name
            ))
        })?;
        let table = validate_schema(schema, assign_defaults(schema, table.renamed(&name)))?;
        let chunk = chunk_name(&name, suffix, scope);
        chunks.save_chunk(&chunk, &table)?;
        info!(source = source.name(), chunk = %chunk, rows = table.len(), "Chunk staged");
        staged.push(chunk);
    }
    Ok(staged)
}
