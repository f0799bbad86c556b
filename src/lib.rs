//! Mundi - hierarchical registry of geographic and administrative regions
//!
//! This library provides:
//! - An immutable region store with a primary tree and labelled auxiliary
//!   hierarchies (continents, healthcare regions, ...)
//! - A code resolver mapping ISO codes, numeric codes, names and
//!   `country/division` paths to canonical region ids
//! - A hierarchical aggregation engine filling dataset tables up (and down)
//!   those hierarchies according to per-column fill policies
//! - A chunk collector merging partial tables into canonical datasets
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mundi::region::RegionStoreBuilder;
//! use mundi::resolver::CodeResolver;
//! use mundi::types::Region;
//!
//! let store = RegionStoreBuilder::new()
//!     .region(Region::new("XX", "World", "world"))
//!     .region(
//!         Region::new("BR", "Brazil", "country")
//!             .with_codes(Some("BR"), Some("BRA"), Some("076"))
//!             .with_parent("XX", 1),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let resolver = CodeResolver::new(Arc::new(store));
//! assert_eq!(resolver.resolve("BRA").unwrap(), "BR");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Region store, builder and field filters
pub mod region;

/// Reference-to-id resolution
pub mod resolver;

/// Dataset tables, schemas and validation
pub mod table;

/// Hierarchical fill policies and the aggregation engine
pub mod aggregation;

/// Merging of partial tables into canonical datasets
pub mod collector;

/// Storage and raw data source interfaces
pub mod store;

/// Immutable query context and atomic snapshot swapping
pub mod context;

// Re-export main types
pub use aggregation::{AggregationEngine, PolicyPlan, RelationSelector};
pub use context::{Context, SharedContext};
pub use error::{Error, Result};
pub use region::{RegionStore, RegionStoreBuilder};
pub use resolver::CodeResolver;
pub use types::{HierarchyEdge, Region, RegionId, RegionRecord};
