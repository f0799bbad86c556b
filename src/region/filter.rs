//! Field predicates over regions

use serde::{Deserialize, Serialize};

use crate::types::Region;

use super::fold_key;

/// Conjunction of optional field filters
///
/// An unset field matches everything. Text comparisons are
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFilter {
    /// Required `type`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Required `subtype`
    #[serde(default)]
    pub subtype: Option<String>,
    /// Required enclosing country
    #[serde(default)]
    pub country_id: Option<String>,
    /// Required level
    #[serde(default)]
    pub level: Option<u32>,
    /// Required primary parent
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Required name
    #[serde(default)]
    pub name: Option<String>,
}

impl RegionFilter {
    /// Filter matching every region
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by type
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Filter by subtype
    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Filter by enclosing country
    pub fn country(mut self, country_id: impl Into<String>) -> Self {
        self.country_id = Some(country_id.into());
        self
    }

    /// Filter by level
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Filter by primary parent
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Filter by name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether no field is constrained
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse a `field=value,field=value` expression
    ///
    /// Recognised fields: `type`, `subtype`, `country`, `level`, `parent`,
    /// `name`.
    pub fn parse(expr: &str) -> Option<Self> {
        let mut filter = Self::new();
        for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, value) = part.split_once('=')?;
            let value = value.trim();
            filter = match field.trim() {
                "type" | "kind" => filter.kind(value),
                "subtype" => filter.subtype(value),
                "country" | "country_id" => filter.country(value),
                "level" => filter.level(value.parse().ok()?),
                "parent" | "parent_id" => filter.parent(value),
                "name" => filter.name(value),
                _ => return None,
            };
        }
        Some(filter)
    }

    /// Test a region against the filter
    pub fn matches(&self, region: &Region) -> bool {
        fn text(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                None => true,
                Some(w) => have.is_some_and(|h| fold_key(h) == fold_key(w)),
            }
        }

        text(&self.kind, Some(&region.kind))
            && text(&self.subtype, region.subtype.as_deref())
            && text(&self.country_id, region.country_id.as_deref())
            && text(&self.parent_id, region.parent_id.as_deref())
            && text(&self.name, Some(&region.name))
            && self.level.map_or(true, |l| l == region.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn df() -> Region {
        Region::new("BR-DF", "Distrito Federal", "state")
            .with_country("BR")
            .with_parent("BR-5", 4)
    }

    #[test]
    fn test_filter_matches() {
        assert!(RegionFilter::new().matches(&df()));
        assert!(RegionFilter::new().kind("STATE").country("br").matches(&df()));
        assert!(!RegionFilter::new().level(3).matches(&df()));
        assert!(!RegionFilter::new().subtype("capital").matches(&df()));
    }

    #[test]
    fn test_filter_parse() {
        let filter = RegionFilter::parse("type=state, country=BR, level=4").unwrap();
        assert_eq!(filter, RegionFilter::new().kind("state").country("BR").level(4));
        assert!(filter.matches(&df()));
        assert!(RegionFilter::parse("colour=blue").is_none());
        assert!(RegionFilter::parse("").unwrap().is_empty());
    }
}
