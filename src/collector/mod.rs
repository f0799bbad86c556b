//! Chunk collector
//!
//! Merges the partial tables ("chunks") staged for a dataset into one
//! canonical table. Chunks are applied from least to most specific so that
//! finer data overrides coarser data on overlapping keys:
//!
//! 1. global chunks (the bare one first, then by suffix)
//! 2. scoped chunks by ascending mean level of their rows
//!
//! The merged table is validated against the dataset's schema, optionally
//! backfilled with the aggregation engine, and saved.

pub mod chunk;

pub use chunk::{mean_level, Chunk, ChunkRank, LEVEL_COLUMN};

use tracing::{debug, info, warn};

use crate::aggregation::{AggregationEngine, PolicyPlan, RelationSelector};
use crate::config::{AggregationConfig, CollectorConfig};
use crate::error::{Error, Result, SchemaError, StoreError};
use crate::resolver::CodeResolver;
use crate::store::{ChunkStore, Store};
use crate::table::{
    assign_defaults, validate_schema, DatasetTable, SchemaRegistry, TableSchema, ValidationError,
};

/// Outcome of collecting several datasets
#[derive(Debug, Default)]
pub struct CollectionReport {
    /// Datasets saved, with their row counts
    pub collected: Vec<(String, usize)>,
    /// Datasets that failed, with the error that stopped them
    pub failed: Vec<(String, Error)>,
}

impl CollectionReport {
    /// Whether every dataset was collected
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total rows written
    pub fn total_rows(&self) -> usize {
        self.collected.iter().map(|(_, rows)| rows).sum()
    }
}

/// Merges chunks into canonical dataset tables
pub struct ChunkCollector<'a> {
    resolver: &'a CodeResolver,
    schemas: &'a SchemaRegistry,
    config: CollectorConfig,
    aggregation: AggregationConfig,
}

impl<'a> ChunkCollector<'a> {
    /// Create a collector with default settings
    pub fn new(resolver: &'a CodeResolver, schemas: &'a SchemaRegistry) -> Self {
        Self {
            resolver,
            schemas,
            config: CollectorConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }

    /// Set collector options
    pub fn with_config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the aggregation options used for backfilling
    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    fn schema(&self, dataset: &str) -> Result<&'a TableSchema> {
        self.schemas.get(dataset).ok_or_else(|| {
            Error::Configuration(format!("no schema declared for dataset '{}'", dataset))
        })
    }

    /// Load, order and merge the chunks of a dataset
    pub fn collect(&self, dataset: &str, chunks: &dyn ChunkStore) -> Result<DatasetTable> {
        let schema = self.schema(dataset)?;
        let store = self.resolver.store();

        let names = chunks.list_chunks(dataset)?;
        if names.is_empty() {
            return Err(StoreError::NoChunks(dataset.to_string()).into());
        }

        let mut loaded = Vec::with_capacity(names.len());
        for name in &names {
            let chunk = Chunk::parse(dataset, name)?;
            let data = self.normalize(chunks.load_chunk(name)?, dataset)?;
            info!(chunk = %chunk.name, rows = data.len(), "Loading chunk");
            let rank = ChunkRank::of(&chunk, &data, store, &self.config.global_scope);
            loaded.push((rank, chunk, data));
        }

        loaded.sort_by(|a, b| a.0.compare(&b.0));
        debug!(
            dataset,
            order = ?loaded.iter().map(|(_, c, _)| c.name.as_str()).collect::<Vec<_>>(),
            "Chunk order"
        );

        let merged = DatasetTable::concat(
            dataset,
            loaded.into_iter().map(|(_, _, data)| data).collect(),
        )?
        .dedupe_keep_last();
        let mut table = validate_schema(schema, assign_defaults(schema, merged))?;

        if self.config.backfill && schema.has_fill_policies() {
            let plan = PolicyPlan::from_schema(schema)?;
            let before = table.len();
            table = AggregationEngine::with_config(store, &self.aggregation).aggregate(
                &table,
                &RelationSelector::All,
                &plan,
            )?;
            debug!(dataset, backfilled = table.len() - before, "Backfilled ancestors");
        }

        Ok(table)
    }

    /// Collect a dataset and save it, returning the row count
    pub fn collect_into(
        &self,
        dataset: &str,
        chunks: &dyn ChunkStore,
        store: &dyn Store,
    ) -> Result<usize> {
        let table = self.collect(dataset, chunks)?;
        store.save_table(dataset, &table)?;
        info!(dataset, rows = table.len(), "Dataset collected");
        Ok(table.len())
    }

    /// Collect several datasets; one failure does not stop the others
    pub fn collect_all<S: AsRef<str>>(
        &self,
        datasets: &[S],
        chunks: &dyn ChunkStore,
        store: &dyn Store,
    ) -> CollectionReport {
        let mut report = CollectionReport::default();
        for dataset in datasets {
            let dataset = dataset.as_ref();
            match self.collect_into(dataset, chunks, store) {
                Ok(rows) => report.collected.push((dataset.to_string(), rows)),
                Err(e) => {
                    warn!(dataset, kind = e.kind(), error = %e, "Dataset collection failed");
                    report.failed.push((dataset.to_string(), e));
                },
            }
        }
        report
    }

    /// Canonicalise row ids and reject duplicate keys within one chunk
    fn normalize(&self, data: DatasetTable, dataset: &str) -> Result<DatasetTable> {
        let mut unknown = Vec::new();
        let data = data.renamed(dataset).map_ids(|id| match self.resolver.resolve(id) {
            Ok(canonical) => Ok(canonical),
            Err(_) => {
                unknown.push(ValidationError::UnknownRegion { id: id.to_string() });
                Ok(id.to_string())
            },
        })?;
        if !unknown.is_empty() {
            return Err(SchemaError {
                table: dataset.to_string(),
                errors: unknown,
            }
            .into());
        }

        let duplicates = data.duplicate_keys();
        if !duplicates.is_empty() {
            return Err(SchemaError {
                table: dataset.to_string(),
                errors: duplicates
                    .into_iter()
                    .map(|(key, count)| ValidationError::DuplicateKey {
                        key: key.to_string(),
                        count,
                    })
                    .collect(),
            }
            .into());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionStoreBuilder;
    use crate::store::MemoryStore;
    use crate::table::{ColumnSchema, ColumnType, FillPolicy, RowKey, Value};
    use crate::types::Region;
    use std::sync::Arc;

    fn resolver() -> CodeResolver {
        let store = RegionStoreBuilder::new()
            .region(Region::new("XX", "World", "world"))
            .region(
                Region::new("BR", "Brazil", "country")
                    .with_codes(Some("BR"), Some("BRA"), Some("076"))
                    .with_parent("XX", 1),
            )
            .region(
                Region::new("BR-DF", "Distrito Federal", "state")
                    .with_codes(Some("DF"), None, Some("53"))
                    .with_parent("BR", 2)
                    .with_country("BR"),
            )
            .build()
            .unwrap();
        CodeResolver::new(Arc::new(store))
    }

    fn schemas() -> SchemaRegistry {
        SchemaRegistry::new().with(
            TableSchema::new("healthcare").with_column(
                ColumnSchema::new("icu", ColumnType::Integer).with_fill(FillPolicy::SumChildren),
            ),
        )
    }

    fn chunk(rows: &[(&str, i64)]) -> DatasetTable {
        let mut t = DatasetTable::new("healthcare", ["icu"]);
        for (id, v) in rows {
            t.push(RowKey::region(*id), vec![Value::Int(*v)]).unwrap();
        }
        t
    }

    #[test]
    fn test_specific_chunk_wins() {
        let resolver = resolver();
        let schemas = schemas();
        let chunks = MemoryStore::new();
        chunks.save_chunk("healthcare-BR", &chunk(&[("BR-DF", 20)])).unwrap();
        chunks.save_chunk("healthcare-XX", &chunk(&[("BR-DF", 10)])).unwrap();

        let table = ChunkCollector::new(&resolver, &schemas)
            .collect("healthcare", &chunks)
            .unwrap();
        assert_eq!(table.value(&RowKey::region("BR-DF"), "icu"), Some(&Value::Int(20)));
        assert_eq!(table.value(&RowKey::region("XX"), "icu"), Some(&Value::Int(20)));
    }

    #[test]
    fn test_ids_are_canonicalised() {
        let resolver = resolver();
        let schemas = schemas();
        let chunks = MemoryStore::new();
        chunks.save_chunk("healthcare-BR", &chunk(&[("br/df", 4)])).unwrap();

        let table = ChunkCollector::new(&resolver, &schemas)
            .with_config(CollectorConfig {
                backfill: false,
                ..CollectorConfig::default()
            })
            .collect("healthcare", &chunks)
            .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(&RowKey::region("BR-DF")));
    }

    #[test]
    fn test_unknown_region_is_schema_error() {
        let resolver = resolver();
        let schemas = schemas();
        let chunks = MemoryStore::new();
        chunks.save_chunk("healthcare-BR", &chunk(&[("Atlantis", 1)])).unwrap();

        let err = ChunkCollector::new(&resolver, &schemas)
            .collect("healthcare", &chunks)
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("Atlantis"));
    }

    #[test]
    fn test_no_chunks_is_an_error() {
        let resolver = resolver();
        let schemas = schemas();
        let err = ChunkCollector::new(&resolver, &schemas)
            .collect("healthcare", &MemoryStore::new())
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NoChunks(_))));
    }

    #[test]
    fn test_collect_all_isolates_failures() {
        let resolver = resolver();
        let schemas = schemas();
        let chunks = MemoryStore::new();
        let store = MemoryStore::new();
        chunks.save_chunk("healthcare-XX", &chunk(&[("BR", 3)])).unwrap();

        let report = ChunkCollector::new(&resolver, &schemas).collect_all(
            &["population", "healthcare"],
            &chunks,
            &store,
        );
        assert!(!report.is_success());
        assert_eq!(report.failed[0].0, "population");
        assert_eq!(report.collected, vec![("healthcare".to_string(), 2)]);
        assert_eq!(report.total_rows(), 2);
        assert!(store.load_table("healthcare").is_ok());
    }
}
