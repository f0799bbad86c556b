//! Integration tests for the hierarchical aggregation engine
//!
//! These tests validate:
//! - Upward fills along the primary tree and auxiliary relations
//! - Cumulative aggregation over every configured relation
//! - Mixed policies, weighted means and downward inheritance
//! - Structural failures on malformed relations

mod common;

use std::collections::BTreeMap;

use mundi::aggregation::{AggregationEngine, PolicyPlan, RelationSelector};
use mundi::config::AggregationConfig;
use mundi::error::{Error, StructuralError};
use mundi::region::{RegionStore, RegionStoreBuilder};
use mundi::table::{
    ColumnSchema, ColumnType, DatasetTable, FillPolicy, RowKey, TableSchema, Value,
    POPULATION_COLUMN,
};
use mundi::types::{HierarchyEdge, Region};

use common::{int_at, int_table, world, world_edges, world_regions};

fn sum_plan(column: &str) -> PolicyPlan {
    PolicyPlan::uniform(FillPolicy::SumChildren, [column]).unwrap()
}

fn world_with_edges(extra: Vec<HierarchyEdge>) -> RegionStore {
    RegionStoreBuilder::new()
        .records(world_regions().into_iter().map(Into::into))
        .edges(world_edges())
        .edges(extra)
        .build()
        .unwrap()
}

// ============================================================================
// SUM along the primary tree
// ============================================================================

#[test]
fn test_single_chain_fills_every_ancestor() {
    let store = RegionStoreBuilder::new()
        .region(Region::new("XX", "World", "world"))
        .region(Region::new("BR", "Brazil", "country").with_parent("XX", 1))
        .region(Region::new("BR-5", "Centro-Oeste", "region").with_parent("BR", 2))
        .region(Region::new("BR-DF", "Distrito Federal", "state").with_parent("BR-5", 3))
        .build()
        .unwrap();
    let table = int_table("population", "population", &[("BR-DF", 5)]);

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("population"))
        .unwrap();

    assert_eq!(out.len(), 4);
    for id in ["BR-DF", "BR-5", "BR", "XX"] {
        assert_eq!(int_at(&out, id, "population"), Some(5), "{}", id);
    }
    // input rows first, then parents layer by layer
    let order: Vec<&str> = out.rows().iter().map(|r| r.key.id.as_str()).collect();
    assert_eq!(order, vec!["BR-DF", "BR-5", "BR", "XX"]);
}

#[test]
fn test_sum_is_transitive_over_levels() {
    let store = world();
    let table = int_table(
        "population",
        "population",
        &[("BR-5300108", 3), ("BR-5208707", 2)],
    );

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("population"))
        .unwrap();

    assert_eq!(int_at(&out, "BR-DF", "population"), Some(3));
    assert_eq!(int_at(&out, "BR-GO", "population"), Some(2));
    assert_eq!(int_at(&out, "BR-5", "population"), Some(5));
    assert_eq!(int_at(&out, "BR", "population"), Some(5));
    assert_eq!(int_at(&out, "XSA", "population"), Some(5));
    assert_eq!(int_at(&out, "XX", "population"), Some(5));
    assert!(!out.contains_key(&RowKey::region("XEU")));
    assert_eq!(out.len(), 8);
    assert!(out.duplicate_keys().is_empty());
}

#[test]
fn test_input_values_win_over_computed_ones() {
    let store = world();
    let table = int_table(
        "population",
        "population",
        &[("BR-5300108", 3), ("BR-DF", 100)],
    );
    let before = table.clone();

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("population"))
        .unwrap();

    assert_eq!(table, before);
    assert_eq!(int_at(&out, "BR-DF", "population"), Some(100));
    assert_eq!(int_at(&out, "XX", "population"), Some(100));
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_all_relations_are_cumulative() {
    let store = world();
    let table = int_table("population", "population", &[("BR", 3), ("RU", 7)]);
    let engine = AggregationEngine::new(&store);

    let continent = engine
        .aggregate(&table, &RelationSelector::parse("continent"), &sum_plan("population"))
        .unwrap();
    assert_eq!(int_at(&continent, "XSA", "population"), Some(3));
    assert_eq!(int_at(&continent, "XAS", "population"), Some(7));
    assert!(!continent.contains_key(&RowKey::region("XEU")));
    assert_eq!(continent.len(), 4);

    // default fills XSA and XEU first, continent then only adds XAS
    let all = engine
        .aggregate(&table, &RelationSelector::parse("all"), &sum_plan("population"))
        .unwrap();
    assert_eq!(int_at(&all, "XSA", "population"), Some(3));
    assert_eq!(int_at(&all, "XEU", "population"), Some(7));
    assert_eq!(int_at(&all, "XAS", "population"), Some(7));
    assert_eq!(int_at(&all, "XX", "population"), Some(10));
    assert_eq!(all.len(), 6);
    assert!(all.duplicate_keys().is_empty());
}

#[test]
fn test_relation_order_comes_from_config() {
    let store = world();
    let config = AggregationConfig {
        relation_order: vec!["sus_region".into()],
        ..AggregationConfig::default()
    };
    let engine = AggregationEngine::with_config(&store, &config);
    assert_eq!(engine.relations(&RelationSelector::All), vec!["sus_region"]);

    let table = int_table("population", "population", &[("BR-5300108", 3)]);
    let out = engine
        .aggregate(&table, &RelationSelector::All, &sum_plan("population"))
        .unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn test_unknown_relation_leaves_table_unchanged() {
    let store = world();
    let table = int_table("population", "population", &[("BR-DF", 1)]);
    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("trade"), &sum_plan("population"))
        .unwrap();
    assert_eq!(out, table);
}

// ============================================================================
// Secondary keys
// ============================================================================

#[test]
fn test_periods_are_aggregated_independently() {
    let store = world();
    let mut table = DatasetTable::new("cases", ["cases"]).with_secondary_key("year");
    table
        .push(RowKey::with_secondary("BR-DF", 2020), vec![Value::Int(1)])
        .unwrap();
    table
        .push(RowKey::with_secondary("BR-GO", 2020), vec![Value::Int(2)])
        .unwrap();
    table
        .push(RowKey::with_secondary("BR-GO", 2021), vec![Value::Int(5)])
        .unwrap();

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("cases"))
        .unwrap();

    let at = |id: &str, year: i64| {
        out.value(&RowKey::with_secondary(id, year), "cases")
            .and_then(Value::as_i64)
    };
    assert_eq!(at("BR-5", 2020), Some(3));
    assert_eq!(at("BR-5", 2021), Some(5));
    assert_eq!(at("XX", 2020), Some(3));
    assert_eq!(at("BR-DF", 2021), None);
}

// ============================================================================
// Policies
// ============================================================================

#[test]
fn test_mixed_policies_in_one_table() {
    let store = world();
    let mut table = DatasetTable::new("healthcare", ["beds", "peak"]);
    table
        .push(RowKey::region("BR-DF"), vec![Value::Int(10), Value::Float(0.5)])
        .unwrap();
    table
        .push(RowKey::region("BR-GO"), vec![Value::Int(4), Value::Float(0.9)])
        .unwrap();

    let mut policies = BTreeMap::new();
    policies.insert("beds".to_string(), FillPolicy::SumChildren);
    policies.insert("peak".to_string(), FillPolicy::MaxChildren);
    let plan = PolicyPlan::from_policies(&policies).unwrap();

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &plan)
        .unwrap();
    assert_eq!(out.columns(), &["beds".to_string(), "peak".to_string()]);
    assert_eq!(int_at(&out, "BR", "beds"), Some(14));
    assert_eq!(
        out.value(&RowKey::region("BR"), "peak"),
        Some(&Value::Float(0.9))
    );
}

#[test]
fn test_population_weighted_mean() {
    let store = world();
    let schema = TableSchema::new("demography")
        .with_column(
            ColumnSchema::new(POPULATION_COLUMN, ColumnType::Integer)
                .with_fill(FillPolicy::SumChildren),
        )
        .with_column(
            ColumnSchema::new("age_mean", ColumnType::Float)
                .with_fill(FillPolicy::MeanPopWeighted),
        );
    let plan = PolicyPlan::from_schema(&schema).unwrap();

    let mut table = DatasetTable::new("demography", [POPULATION_COLUMN, "age_mean"]);
    table
        .push(RowKey::region("BR-5300108"), vec![Value::Int(3), Value::Float(30.0)])
        .unwrap();
    table
        .push(RowKey::region("BR-5208707"), vec![Value::Int(1), Value::Float(40.0)])
        .unwrap();

    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &plan)
        .unwrap();
    let age = |id: &str| out.value(&RowKey::region(id), "age_mean").and_then(Value::as_f64);
    assert_eq!(age("BR-DF"), Some(30.0));
    assert_eq!(age("BR-GO"), Some(40.0));
    assert_eq!(age("BR-5"), Some(32.5));
    assert_eq!(age("XX"), Some(32.5));
    assert_eq!(int_at(&out, "BR-5", POPULATION_COLUMN), Some(4));
}

#[test]
fn test_inherit_fills_children_from_parents() {
    let store = world();
    let mut table = DatasetTable::new("un_region", ["un_region"]);
    table
        .push(RowKey::region("BR"), vec![Value::from("Latin America")])
        .unwrap();
    table
        .push(RowKey::region("BR-GO"), vec![Value::from("Goias override")])
        .unwrap();

    let plan = PolicyPlan::uniform(FillPolicy::Inherit, ["un_region"]).unwrap();
    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &plan)
        .unwrap();

    let region = |id: &str| {
        out.value(&RowKey::region(id), "un_region")
            .and_then(|v| v.as_str().map(str::to_string))
    };
    assert_eq!(region("BR-5").as_deref(), Some("Latin America"));
    assert_eq!(region("BR-DF").as_deref(), Some("Latin America"));
    assert_eq!(region("BR-SUS:53001").as_deref(), Some("Latin America"));
    assert_eq!(region("BR-GO").as_deref(), Some("Goias override"));
    assert_eq!(region("BR-5208707").as_deref(), Some("Goias override"));
    assert_eq!(region("XSA"), None);
}

#[test]
fn test_conflicting_policies_rejected_before_aggregation() {
    let schema = TableSchema::new("t").with_column(
        ColumnSchema::new("name", ColumnType::Text).with_fill(FillPolicy::SumChildren),
    );
    assert_eq!(
        PolicyPlan::from_schema(&schema).unwrap_err().kind(),
        "ConfigurationError"
    );
}

#[test]
fn test_text_values_in_numeric_policy_are_schema_errors() {
    let store = world();
    let mut table = DatasetTable::new("t", ["beds"]);
    table.push(RowKey::region("BR-DF"), vec![Value::from("many")]).unwrap();
    let err = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("beds"))
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
}

// ============================================================================
// Structural failures
// ============================================================================

#[test]
fn test_duplicate_parent_names_relation_and_child() {
    let store = world_with_edges(vec![HierarchyEdge::new("BR-5300108", "BR-DF", "sus_region")]);
    let diagnostics = store.relation_diagnostics("sus_region").unwrap();
    assert!(diagnostics.multiple_parents.contains_key("BR-5300108"));

    let table = int_table("population", "population", &[("BR-5300108", 3)]);
    let err = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("sus_region"), &sum_plan("population"))
        .unwrap_err();

    match err {
        Error::Structural(StructuralError::DuplicateParent {
            relation,
            child,
            parents,
        }) => {
            assert_eq!(relation, "sus_region");
            assert_eq!(child, "BR-5300108");
            assert_eq!(parents.len(), 2);
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_cycle_is_reported() {
    let store = world_with_edges(vec![
        HierarchyEdge::new("XEU", "XAS", "trade"),
        HierarchyEdge::new("XAS", "XEU", "trade"),
    ]);
    let table = int_table("population", "population", &[("XEU", 1)]);
    let err = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("trade"), &sum_plan("population"))
        .unwrap_err();

    match err {
        Error::Structural(StructuralError::Cycle { relation, nodes }) => {
            assert_eq!(relation, "trade");
            assert!(nodes.contains(&"XAS".to_string()));
            assert!(nodes.contains(&"XEU".to_string()));
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_deep_relation_terminates_within_its_depth() {
    let chain = [
        "BR-5208707",
        "BR-5300108",
        "BR-GO",
        "BR-DF",
        "BR-5",
        "BR",
        "RU",
        "XAS",
        "XEU",
        "XSA",
        "XX",
    ];
    let edges = chain
        .windows(2)
        .map(|pair| HierarchyEdge::new(pair[0], pair[1], "chain"))
        .collect();
    let store = world_with_edges(edges);
    assert_eq!(store.max_level(), 5);
    assert_eq!(store.relation_depth("chain"), 10);

    let config = AggregationConfig {
        iteration_margin: 0,
        ..AggregationConfig::default()
    };
    let engine = AggregationEngine::with_config(&store, &config);
    assert_eq!(engine.iteration_bound("chain"), 10);
    assert_eq!(engine.iteration_bound("default"), 5);

    let table = int_table("population", "population", &[("BR-5208707", 1)]);
    let out = engine
        .aggregate(&table, &RelationSelector::parse("chain"), &sum_plan("population"))
        .unwrap();
    assert_eq!(out.len(), chain.len());
    assert_eq!(int_at(&out, "XX", "population"), Some(1));
}

#[test]
fn test_inherit_column_leaves_sums_untouched_across_relations() {
    let store = world();
    let mut table = DatasetTable::new("demography", ["population", "un_region"]);
    table
        .push(RowKey::region("XX"), vec![Value::Null, Value::from("World")])
        .unwrap();
    table
        .push(RowKey::region("BR"), vec![Value::Int(3), Value::Null])
        .unwrap();
    table
        .push(RowKey::region("RU"), vec![Value::Int(7), Value::Null])
        .unwrap();

    let mut policies = BTreeMap::new();
    policies.insert("population".to_string(), FillPolicy::SumChildren);
    let sum_only = PolicyPlan::from_policies(&policies).unwrap();
    policies.insert("un_region".to_string(), FillPolicy::Inherit);
    let mixed = PolicyPlan::from_policies(&policies).unwrap();

    let engine = AggregationEngine::new(&store);
    let plain = engine.aggregate(&table, &RelationSelector::All, &sum_only).unwrap();
    let out = engine.aggregate(&table, &RelationSelector::All, &mixed).unwrap();

    for id in ["XSA", "XEU", "XAS"] {
        assert_eq!(
            int_at(&out, id, "population"),
            int_at(&plain, id, "population"),
            "population of {}",
            id
        );
    }
    assert_eq!(int_at(&out, "XAS", "population"), Some(7));
    assert_eq!(
        out.value(&RowKey::region("XAS"), "un_region"),
        Some(&Value::from("World"))
    );
}

#[test]
fn test_lowercase_ids_reach_their_ancestors() {
    let store = world();
    let table = int_table("population", "population", &[("br-df", 2), ("br-go", 5)]);
    let out = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("population"))
        .unwrap();
    assert_eq!(int_at(&out, "BR-DF", "population"), Some(2));
    assert_eq!(int_at(&out, "BR", "population"), Some(7));

    let table = int_table("population", "population", &[("Atlantis", 1)]);
    let err = AggregationEngine::new(&store)
        .aggregate(&table, &RelationSelector::parse("default"), &sum_plan("population"))
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert!(err.to_string().contains("Atlantis"));
}
