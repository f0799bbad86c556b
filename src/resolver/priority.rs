//! Type-priority tie-break for ambiguous subdivision matches

use crate::types::{Region, RegionId};

/// Ordered list of region types used to rank several matches
///
/// When a subdivision reference matches more than one region, the first
/// type in this list present among the matches wins. The ordering is an
/// arbitrary, deterministic policy; it carries no geographic meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePriority {
    types: Vec<String>,
}

impl Default for TypePriority {
    fn default() -> Self {
        Self::new(["state", "city", "district", "region"])
    }
}

impl TypePriority {
    /// Create a priority list, highest priority first
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(|t| t.into().to_lowercase()).collect(),
        }
    }

    /// Types, highest priority first
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Rank of a type, if listed
    pub fn rank(&self, kind: &str) -> Option<usize> {
        let kind = kind.to_lowercase();
        self.types.iter().position(|t| *t == kind)
    }

    /// Pick a single region among several candidates
    ///
    /// Returns the ids that could not be separated when the best-ranked type
    /// is shared by several candidates, or when no candidate has a listed
    /// type.
    pub fn pick<'a>(&self, candidates: &[&'a Region]) -> Result<&'a Region, Vec<RegionId>> {
        if let [only] = candidates {
            return Ok(*only);
        }

        let best = candidates.iter().filter_map(|r| self.rank(&r.kind)).min();
        let Some(best) = best else {
            return Err(candidates.iter().map(|r| r.id.clone()).collect());
        };

        let winners: Vec<&'a Region> = candidates
            .iter()
            .copied()
            .filter(|r| self.rank(&r.kind) == Some(best))
            .collect();
        match winners.as_slice() {
            [winner] => Ok(*winner),
            _ => Err(winners.iter().map(|r| r.id.clone()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_by_priority() {
        let city = Region::new("BR-5300108", "Brasilia", "city");
        let district = Region::new("BR-530010805", "Brasilia", "district");
        let priority = TypePriority::default();

        assert_eq!(priority.pick(&[&district, &city]).unwrap().id, "BR-5300108");
    }

    #[test]
    fn test_tie_within_type_is_ambiguous() {
        let a = Region::new("BR-1", "Bom Jesus", "city");
        let b = Region::new("BR-2", "Bom Jesus", "city");
        let err = TypePriority::default().pick(&[&a, &b]).unwrap_err();
        assert_eq!(err, vec!["BR-1".to_string(), "BR-2".to_string()]);
    }

    #[test]
    fn test_unlisted_types_are_ambiguous() {
        let a = Region::new("BR-1", "Centro", "neighborhood");
        let b = Region::new("BR-2", "Centro", "zone");
        assert!(TypePriority::default().pick(&[&a, &b]).is_err());

        let custom = TypePriority::new(["zone"]);
        assert_eq!(custom.pick(&[&a, &b]).unwrap().id, "BR-2");
    }
}
