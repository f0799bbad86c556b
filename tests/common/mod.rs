//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use mundi::region::{RegionStore, RegionStoreBuilder};
use mundi::resolver::CodeResolver;
use mundi::table::{DatasetTable, RowKey, Value};
use mundi::types::{HierarchyEdge, Region, CONTINENT_RELATION, SUS_REGION_RELATION};

/// Small world:
///
/// ```text
/// XX
/// ├── XSA South America
/// │   └── BR Brazil
/// │       └── BR-5 Centro-Oeste
/// │           ├── BR-DF Distrito Federal
/// │           │   ├── BR-5300108 Brasilia
/// │           │   └── BR-SUS:53001 Distrito Federal (SUS region)
/// │           └── BR-GO Goias
/// │               └── BR-5208707 Goiania
/// ├── XEU Europe
/// │   └── RU Russia
/// └── XAS Asia
/// ```
///
/// Russia belongs to Asia in the `continent` relation. Brasilia belongs to
/// the DF healthcare region in `sus_region`.
pub fn world_regions() -> Vec<Region> {
    vec![
        Region::new("XX", "World", "world"),
        Region::new("XSA", "South America", "continent").with_parent("XX", 1),
        Region::new("XEU", "Europe", "continent").with_parent("XX", 1),
        Region::new("XAS", "Asia", "continent").with_parent("XX", 1),
        Region::new("BR", "Brazil", "country")
            .with_codes(Some("BR"), Some("BRA"), Some("076"))
            .with_parent("XSA", 2),
        Region::new("RU", "Russia", "country")
            .with_codes(Some("RU"), Some("RUS"), Some("643"))
            .with_parent("XEU", 2),
        Region::new("BR-5", "Centro-Oeste", "region")
            .with_country("BR")
            .with_parent("BR", 3),
        Region::new("BR-DF", "Distrito Federal", "state")
            .with_codes(Some("DF"), None, Some("53"))
            .with_country("BR")
            .with_parent("BR-5", 4),
        Region::new("BR-GO", "Goias", "state")
            .with_codes(Some("GO"), None, Some("52"))
            .with_country("BR")
            .with_parent("BR-5", 4),
        Region::new("BR-5300108", "Brasilia", "city")
            .with_codes(None, None, Some("5300108"))
            .with_country("BR")
            .with_parent("BR-DF", 5),
        Region::new("BR-5208707", "Goiania", "city")
            .with_codes(None, None, Some("5208707"))
            .with_country("BR")
            .with_parent("BR-GO", 5),
        Region::new("BR-SUS:53001", "Distrito Federal", "region")
            .with_subtype("sus")
            .with_country("BR")
            .with_parent("BR-DF", 5),
    ]
}

/// Auxiliary edges of the small world
pub fn world_edges() -> Vec<HierarchyEdge> {
    vec![
        HierarchyEdge::new("BR", "XSA", CONTINENT_RELATION),
        HierarchyEdge::new("RU", "XAS", CONTINENT_RELATION),
        HierarchyEdge::new("BR-5300108", "BR-SUS:53001", SUS_REGION_RELATION),
    ]
}

/// Store of the small world
pub fn world() -> RegionStore {
    RegionStoreBuilder::new()
        .records(world_regions().into_iter().map(Into::into))
        .edges(world_edges())
        .build()
        .expect("fixture store must build")
}

/// Resolver over the small world
pub fn resolver() -> CodeResolver {
    CodeResolver::new(Arc::new(world()))
}

/// Single-column integer table keyed by region id
pub fn int_table(name: &str, column: &str, rows: &[(&str, i64)]) -> DatasetTable {
    let mut table = DatasetTable::new(name, [column]);
    for (id, value) in rows {
        table
            .push(RowKey::region(*id), vec![Value::Int(*value)])
            .expect("row width matches");
    }
    table
}

/// Integer cell of a table
pub fn int_at(table: &DatasetTable, id: &str, column: &str) -> Option<i64> {
    table
        .value(&RowKey::region(id), column)
        .and_then(Value::as_i64)
}
