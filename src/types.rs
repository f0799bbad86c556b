//! Core data types used throughout the registry
//!
//! # Key Types
//!
//! - **`RegionId`**: canonical mundi code of a region ("BR", "BR-DF", "XSA")
//! - **`Region`**: one node of the registry with its alternate codes and level
//! - **`RegionRecord`**: input form of a region, level optional
//! - **`HierarchyEdge`**: child/parent edge labelled with a relation
//!
//! # Example
//!
//! ```rust
//! use mundi::types::{HierarchyEdge, Region, DEFAULT_RELATION};
//!
//! let region = Region::new("BR", "Brazil", "country")
//!     .with_codes(Some("BR"), Some("BRA"), Some("076"))
//!     .with_parent("XSA", 2);
//! assert!(region.is_country());
//!
//! let edge = HierarchyEdge::new("BR", "XSA", DEFAULT_RELATION);
//! assert_eq!(edge.relation, "default");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical region identifier
///
/// Ids are conventionally upper case and made of an ASCII prefix plus an
/// optional `-suffix` or `:suffix`. Every algorithm except the resolver
/// treats them as opaque keys.
pub type RegionId = String;

/// Relation shadowing the primary tree
pub const DEFAULT_RELATION: &str = "default";

/// Secondary continent assignment of transcontinental countries
pub const CONTINENT_RELATION: &str = "continent";

/// Brazilian healthcare (SUS) regions
pub const SUS_REGION_RELATION: &str = "sus_region";

/// Id of the world root
pub const WORLD_ID: &str = "XX";

/// Type tag of country regions
pub const COUNTRY_TYPE: &str = "country";

/// Type tag of continent regions
pub const CONTINENT_TYPE: &str = "continent";

/// A node in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Canonical id
    pub id: RegionId,
    /// Display name (not unique)
    pub name: String,
    /// Classification tag (country, state, city, district, region, continent...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional refinement of `kind`
    #[serde(default)]
    pub subtype: Option<String>,
    /// Short code (ISO alpha-2 for countries)
    #[serde(default)]
    pub short_code: Option<String>,
    /// Long code (ISO alpha-3 for countries)
    #[serde(default)]
    pub long_code: Option<String>,
    /// Numeric code, unique only within a country
    #[serde(default)]
    pub numeric_code: Option<String>,
    /// Enclosing country, empty for country and continent level nodes
    #[serde(default)]
    pub country_id: Option<RegionId>,
    /// Primary parent, empty only for the root
    #[serde(default)]
    pub parent_id: Option<RegionId>,
    /// Depth in the primary hierarchy (root = 0)
    pub level: u32,
}

impl Region {
    /// Create a root-level region with no codes
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            subtype: None,
            short_code: None,
            long_code: None,
            numeric_code: None,
            country_id: None,
            parent_id: None,
            level: 0,
        }
    }

    /// Set short, long and numeric codes
    pub fn with_codes(
        mut self,
        short_code: Option<&str>,
        long_code: Option<&str>,
        numeric_code: Option<&str>,
    ) -> Self {
        self.short_code = short_code.map(str::to_string);
        self.long_code = long_code.map(str::to_string);
        self.numeric_code = numeric_code.map(str::to_string);
        self
    }

    /// Set the primary parent and level
    pub fn with_parent(mut self, parent_id: impl Into<String>, level: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.level = level;
        self
    }

    /// Set the enclosing country
    pub fn with_country(mut self, country_id: impl Into<String>) -> Self {
        self.country_id = Some(country_id.into());
        self
    }

    /// Set the subtype
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Whether this region is a country
    pub fn is_country(&self) -> bool {
        self.kind == COUNTRY_TYPE
    }

    /// Whether this region is the root of the primary hierarchy
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// ASCII prefix of the id (the part before any `-` or `:`)
    pub fn prefix(&self) -> &str {
        id_prefix(&self.id)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

/// Return the prefix of a mundi code
pub fn id_prefix(id: &str) -> &str {
    match id.find(['-', ':']) {
        Some(pos) => &id[..pos],
        None => id,
    }
}

/// Input form of a region, as produced by data sources
///
/// Identical to [`Region`] except that `level` may be missing, in which case
/// it is inferred from the parent chain when the store is built. Empty
/// strings in optional fields are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Canonical id
    pub id: RegionId,
    /// Display name
    pub name: String,
    /// Classification tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional refinement of `kind`
    #[serde(default)]
    pub subtype: Option<String>,
    /// Short code
    #[serde(default)]
    pub short_code: Option<String>,
    /// Long code
    #[serde(default)]
    pub long_code: Option<String>,
    /// Numeric code
    #[serde(default)]
    pub numeric_code: Option<String>,
    /// Enclosing country
    #[serde(default)]
    pub country_id: Option<RegionId>,
    /// Primary parent
    #[serde(default)]
    pub parent_id: Option<RegionId>,
    /// Declared level, if known
    #[serde(default)]
    pub level: Option<u32>,
}

impl RegionRecord {
    /// Convert into a region with the given level
    pub fn into_region(self, level: u32) -> Region {
        let blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Region {
            id: self.id,
            name: self.name,
            kind: self.kind,
            subtype: blank(self.subtype),
            short_code: blank(self.short_code),
            long_code: blank(self.long_code),
            numeric_code: blank(self.numeric_code),
            country_id: blank(self.country_id),
            parent_id: blank(self.parent_id),
            level,
        }
    }

    /// Primary parent, with empty strings read as absent
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Drop the declared level so it gets inferred
    pub fn without_level(mut self) -> Self {
        self.level = None;
        self
    }
}

impl From<Region> for RegionRecord {
    fn from(r: Region) -> Self {
        Self {
            id: r.id,
            name: r.name,
            kind: r.kind,
            subtype: r.subtype,
            short_code: r.short_code,
            long_code: r.long_code,
            numeric_code: r.numeric_code,
            country_id: r.country_id,
            parent_id: r.parent_id,
            level: Some(r.level),
        }
    }
}

/// Edge of an auxiliary hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyEdge {
    /// Child region
    pub child_id: RegionId,
    /// Parent region
    pub parent_id: RegionId,
    /// Relation label partitioning edges into independent graphs
    pub relation: String,
}

impl HierarchyEdge {
    /// Create a new edge
    pub fn new(
        child_id: impl Into<String>,
        parent_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            child_id: child_id.into(),
            parent_id: parent_id.into(),
            relation: relation.into(),
        }
    }
}

impl fmt::Display for HierarchyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.child_id, self.relation, self.parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_prefix() {
        assert_eq!(id_prefix("BR"), "BR");
        assert_eq!(id_prefix("BR-DF"), "BR");
        assert_eq!(id_prefix("BR-SUS:35016"), "BR");
        assert_eq!(id_prefix("XSA"), "XSA");
    }

    #[test]
    fn test_record_blank_fields_become_none() {
        let record = RegionRecord {
            id: "BR-DF".into(),
            name: "Distrito Federal".into(),
            kind: "state".into(),
            subtype: Some("".into()),
            short_code: Some("DF".into()),
            long_code: None,
            numeric_code: Some("53".into()),
            country_id: Some("BR".into()),
            parent_id: Some("BR-5".into()),
            level: None,
        };
        let region = record.into_region(4);
        assert_eq!(region.subtype, None);
        assert_eq!(region.level, 4);
        assert_eq!(region.parent_id.as_deref(), Some("BR-5"));
    }

    #[test]
    fn test_region_serde_uses_type_field() {
        let region = Region::new("XX", "World", "world");
        let json = serde_json::to_string(&region).unwrap();
        assert!(json.contains("\"type\":\"world\""));
        let back: Region = serde_json::from_str(&json).unwrap();
        assert_eq!(back, region);
    }
}
