//! Integration tests for chunk collection
//!
//! These tests validate:
//! - Merge precedence (global before scoped, coarse before fine)
//! - Id canonicalisation and per-chunk duplicate detection
//! - Backfilling of ancestors after merging
//! - End-to-end staging and collection through a JSON data directory

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use mundi::collector::{ChunkCollector, ChunkRank, Chunk};
use mundi::config::{CollectorConfig, Config};
use mundi::error::{Error, SourceError, StoreError};
use mundi::region::RegionFilter;
use mundi::store::{stage_source, ChunkStore, JsonDirStore, MemoryStore, RawDataSource, Store};
use mundi::table::{ColumnSchema, ColumnType, DatasetTable, FillPolicy, SchemaRegistry, TableSchema};
use mundi::types::RegionRecord;
use mundi::Context;
use tempfile::tempdir;

use common::{int_at, int_table, resolver, world, world_edges, world_regions};

// ============================================================================
// Helper Functions
// ============================================================================

fn healthcare_schema() -> TableSchema {
    TableSchema::new("healthcare").with_column(
        ColumnSchema::new("icu", ColumnType::Integer).with_fill(FillPolicy::SumChildren),
    )
}

fn schemas() -> SchemaRegistry {
    SchemaRegistry::new().with(healthcare_schema())
}

fn icu(rows: &[(&str, i64)]) -> DatasetTable {
    int_table("healthcare", "icu", rows)
}

fn without_backfill() -> CollectorConfig {
    CollectorConfig {
        backfill: false,
        ..CollectorConfig::default()
    }
}

struct StaticSource {
    tables: BTreeMap<String, DatasetTable>,
}

impl RawDataSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn collect(&self) -> Result<BTreeMap<String, DatasetTable>, SourceError> {
        Ok(self.tables.clone())
    }
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
fn test_scoped_chunk_overrides_global() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-XX", &icu(&[("BR-DF", 10), ("BR-GO", 4)])).unwrap();
    chunks.save_chunk("healthcare-BR", &icu(&[("BR-DF", 20)])).unwrap();

    let table = ChunkCollector::new(&resolver, &schemas)
        .collect("healthcare", &chunks)
        .unwrap();

    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(20));
    assert_eq!(int_at(&table, "BR-GO", "icu"), Some(4));
    // ancestors are backfilled from the merged values
    assert_eq!(int_at(&table, "BR-5", "icu"), Some(24));
    assert_eq!(int_at(&table, "XX", "icu"), Some(24));
    assert_eq!(table.len(), 6);
}

#[test]
fn test_coarser_scoped_chunk_applied_first() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    // listed first by name, but finer: applied last
    chunks.save_chunk("healthcare-fine-BR", &icu(&[("BR-DF", 5)])).unwrap();
    chunks
        .save_chunk("healthcare-zcoarse-BR", &icu(&[("BR-DF", 9), ("BR", 50)]))
        .unwrap();

    let table = ChunkCollector::new(&resolver, &schemas)
        .with_config(without_backfill())
        .collect("healthcare", &chunks)
        .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(5));
    assert_eq!(int_at(&table, "BR", "icu"), Some(50));
}

#[test]
fn test_bare_global_chunk_applied_before_suffixed() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-XX", &icu(&[("BR-DF", 1)])).unwrap();
    chunks.save_chunk("healthcare-AAA-XX", &icu(&[("BR-DF", 2)])).unwrap();

    let table = ChunkCollector::new(&resolver, &schemas)
        .with_config(without_backfill())
        .collect("healthcare", &chunks)
        .unwrap();
    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(2));
}

#[test]
fn test_unmatched_scope_counts_as_global() {
    let store = world();
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-BR", &icu(&[("BR-DF", 20)])).unwrap();
    chunks.save_chunk("healthcare-ZZ", &icu(&[("BR-DF", 30)])).unwrap();

    let zz = Chunk::parse("healthcare", "healthcare-ZZ").unwrap();
    assert!(zz.is_global(&store, "XX"));
    assert!(matches!(
        ChunkRank::of(&zz, &icu(&[]), &store, "XX"),
        ChunkRank::Global { .. }
    ));

    let table = ChunkCollector::new(&resolver, &schemas)
        .with_config(without_backfill())
        .collect("healthcare", &chunks)
        .unwrap();
    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(20));
}

#[test]
fn test_custom_global_scope() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-BR", &icu(&[("BR-DF", 20)])).unwrap();
    chunks.save_chunk("healthcare-RU", &icu(&[("BR-DF", 1)])).unwrap();

    // with RU as the global scope its chunk is applied before BR's
    let table = ChunkCollector::new(&resolver, &schemas)
        .with_config(CollectorConfig {
            backfill: false,
            global_scope: "RU".into(),
        })
        .collect("healthcare", &chunks)
        .unwrap();
    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(20));
}

// ============================================================================
// Normalisation
// ============================================================================

#[test]
fn test_references_are_canonicalised_before_merging() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-XX", &icu(&[("BR/DF", 1)])).unwrap();
    chunks.save_chunk("healthcare-BR", &icu(&[("br-df", 2)])).unwrap();

    let table = ChunkCollector::new(&resolver, &schemas)
        .with_config(without_backfill())
        .collect("healthcare", &chunks)
        .unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(int_at(&table, "BR-DF", "icu"), Some(2));
}

#[test]
fn test_duplicate_within_chunk_is_rejected() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks
        .save_chunk("healthcare-BR", &icu(&[("BR-DF", 1), ("br/df", 2)]))
        .unwrap();

    let err = ChunkCollector::new(&resolver, &schemas)
        .collect("healthcare", &chunks)
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert!(err.to_string().contains("BR-DF"));
}

#[test]
fn test_missing_chunks_and_schema() {
    let resolver = resolver();
    let schemas = schemas();
    let collector = ChunkCollector::new(&resolver, &schemas);

    let err = collector.collect("healthcare", &MemoryStore::new()).unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::NoChunks(ref t)) if t == "healthcare"));

    let err = collector.collect("population", &MemoryStore::new()).unwrap_err();
    assert_eq!(err.kind(), "ConfigurationError");
}

#[test]
fn test_invalid_chunk_name() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-", &icu(&[("BR", 1)])).unwrap();

    let err = ChunkCollector::new(&resolver, &schemas)
        .collect("healthcare", &chunks)
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::InvalidChunkName(_))));
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_stage_collect_and_query_on_disk() {
    let dir = tempdir().unwrap();
    let data = JsonDirStore::open(dir.path()).unwrap();
    let records: Vec<RegionRecord> = world_regions().into_iter().map(Into::into).collect();
    data.save_regions(&records, &world_edges()).unwrap();

    let mut config = Config::default();
    config.store.data_dir = dir.path().to_path_buf();
    config.datasets = vec![
        healthcare_schema(),
        TableSchema::new("population").with_column(
            ColumnSchema::new("population", ColumnType::Integer)
                .with_fill(FillPolicy::SumChildren),
        ),
    ];
    let context = Context::from_config(&config).unwrap();

    let mut tables = BTreeMap::new();
    tables.insert("healthcare".to_string(), icu(&[("BR-5300108", 3), ("BR-5208707", 4)]));
    let source = StaticSource { tables };
    let staged = stage_source(&source, context.schemas(), &data, "BR", Some("cnes")).unwrap();
    assert_eq!(staged, vec!["healthcare-cnes-BR"]);
    assert!(dir.path().join("chunks/healthcare-cnes-BR.json").exists());

    let report = context
        .collector()
        .collect_all(&context.schemas().names(), &data, context.tables());
    assert_eq!(report.collected.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "population");

    let states = context
        .query_table("healthcare", &RegionFilter::new().kind("state"))
        .unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(int_at(&states, "BR-DF", "icu"), Some(3));
    assert_eq!(int_at(&states, "BR-GO", "icu"), Some(4));

    let all = context.query_table("healthcare", &RegionFilter::new()).unwrap();
    assert_eq!(int_at(&all, "XX", "icu"), Some(7));
    assert_eq!(int_at(&all, "BR-SUS:53001", "icu"), Some(3));
}

#[test]
fn test_collect_into_any_table_store() {
    let resolver = resolver();
    let schemas = schemas();
    let chunks = MemoryStore::new();
    chunks.save_chunk("healthcare-XX", &icu(&[("RU", 2)])).unwrap();

    let tables: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let rows = ChunkCollector::new(&resolver, &schemas)
        .collect_into("healthcare", &chunks, tables.as_ref())
        .unwrap();
    assert_eq!(rows, 4);
    assert_eq!(tables.table_names().unwrap(), vec!["healthcare"]);
}
