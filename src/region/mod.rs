//! Region registry
//!
//! The registry is an immutable [`RegionStore`] snapshot built once by a
//! [`RegionStoreBuilder`]. It holds the primary tree (`parent_id`/`level`)
//! and any number of auxiliary relations, each a set of child/parent edges.
//!
//! # Example
//!
//! ```rust
//! use mundi::region::RegionStoreBuilder;
//! use mundi::types::{HierarchyEdge, Region, RegionRecord};
//!
//! let store = RegionStoreBuilder::new()
//!     .region(Region::new("XX", "World", "world"))
//!     .region(Region::new("XSA", "South America", "continent").with_parent("XX", 1))
//!     .record(RegionRecord::from(Region::new("BR", "Brazil", "country").with_parent("XSA", 0)).without_level())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(store.get("br").unwrap().level, 2);
//! assert_eq!(store.children("XSA", "default").unwrap(), vec!["BR".to_string()]);
//! ```

mod builder;
mod filter;
mod store;

pub use builder::{RegionStoreBuilder, MAX_PARENT_CHAIN};
pub use filter::RegionFilter;
pub use store::{RegionStore, RelationDiagnostics};

/// Case-folded form of a text key used by every name and id comparison
pub(crate) fn fold_key(s: &str) -> String {
    s.trim().to_lowercase()
}
