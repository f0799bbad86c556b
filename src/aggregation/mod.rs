//! Hierarchical aggregation
//!
//! Fills a dataset table up (and, for `INHERIT` columns, down) the
//! hierarchies of a [`RegionStore`](crate::region::RegionStore).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │          Table schema               │
//! │   column -> fill / missing policy   │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │           Policy plan               │
//! │  one column group per fill policy   │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │       Aggregation engine            │
//! │  layered fixpoint per relation      │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │         Filled table                │
//! │  input rows first, then parents     │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use mundi::aggregation::{AggregationEngine, PolicyPlan, RelationSelector};
//! use mundi::region::RegionStoreBuilder;
//! use mundi::table::{DatasetTable, FillPolicy, RowKey, Value};
//! use mundi::types::Region;
//!
//! let store = RegionStoreBuilder::new()
//!     .region(Region::new("XX", "World", "world"))
//!     .region(Region::new("BR", "Brazil", "country").with_parent("XX", 1))
//!     .build()
//!     .unwrap();
//!
//! let mut table = DatasetTable::new("population", ["population"]);
//! table.push(RowKey::region("BR"), vec![Value::Int(213)]).unwrap();
//!
//! let plan = PolicyPlan::uniform(FillPolicy::SumChildren, ["population"]).unwrap();
//! let filled = AggregationEngine::new(&store)
//!     .aggregate(&table, &RelationSelector::All, &plan)
//!     .unwrap();
//! assert_eq!(filled.value(&RowKey::region("XX"), "population"), Some(&Value::Int(213)));
//! ```

pub mod engine;
pub mod functions;
pub mod policy;

pub use engine::{AggregationEngine, RelationSelector, ITERATION_MARGIN};
pub use policy::{ColumnPolicy, PolicyGroup, PolicyPlan};
