//! Chunk naming and precedence

use std::cmp::Ordering;

use crate::error::{Result, StoreError};
use crate::region::RegionStore;
use crate::table::DatasetTable;

/// Column that, when present, gives a chunk's levels directly
pub const LEVEL_COLUMN: &str = "level";

/// Identity of a partial table, parsed from `<table>-[<suffix>-]<scope>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Full chunk name
    pub name: String,
    /// Dataset the chunk belongs to
    pub table: String,
    /// Free-form qualifier, empty when absent
    pub suffix: String,
    /// Scope region the chunk was produced for
    pub scope: String,
}

impl Chunk {
    /// Parse a chunk name belonging to `table`
    pub fn parse(table: &str, name: &str) -> Result<Self> {
        let invalid = || StoreError::InvalidChunkName(name.to_string());
        let rest = name
            .strip_prefix(table)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let (suffix, scope) = match rest.rsplit_once('-') {
            Some((suffix, scope)) => (suffix, scope),
            None => ("", rest),
        };
        if scope.is_empty() {
            return Err(invalid().into());
        }
        Ok(Self {
            name: name.to_string(),
            table: table.to_string(),
            suffix: suffix.to_string(),
            scope: scope.to_string(),
        })
    }

    /// Whether the chunk applies globally
    ///
    /// Scopes that match no country prefix in the store count as global.
    pub fn is_global(&self, store: &RegionStore, global_scope: &str) -> bool {
        if self.scope.eq_ignore_ascii_case(global_scope) {
            return true;
        }
        !store
            .iter()
            .any(|r| r.is_country() && r.prefix().eq_ignore_ascii_case(&self.scope))
    }
}

/// Merge precedence of a chunk; lower ranks are applied first
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRank {
    /// Global chunk: the bare chunk first, then by suffix
    Global {
        /// Chunk suffix
        suffix: String,
    },
    /// Scoped chunk: coarser data first
    Scoped {
        /// Mean level of the chunk's rows
        mean_level: f64,
    },
}

impl ChunkRank {
    /// Rank a loaded chunk
    pub fn of(chunk: &Chunk, data: &DatasetTable, store: &RegionStore, global_scope: &str) -> Self {
        if chunk.is_global(store, global_scope) {
            ChunkRank::Global {
                suffix: chunk.suffix.clone(),
            }
        } else {
            ChunkRank::Scoped {
                mean_level: mean_level(data, store).unwrap_or(0.0),
            }
        }
    }

    /// Total order used for a stable sort
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ChunkRank::Global { suffix: a }, ChunkRank::Global { suffix: b }) => {
                (!a.is_empty(), a).cmp(&(!b.is_empty(), b))
            },
            (ChunkRank::Global { .. }, ChunkRank::Scoped { .. }) => Ordering::Less,
            (ChunkRank::Scoped { .. }, ChunkRank::Global { .. }) => Ordering::Greater,
            (ChunkRank::Scoped { mean_level: a }, ChunkRank::Scoped { mean_level: b }) => {
                a.total_cmp(b)
            },
        }
    }
}

/// Mean level of a chunk's rows
///
/// Read from the `level` column when the chunk has one, otherwise looked up
/// in the store. Rows of unknown regions are ignored.
pub fn mean_level(data: &DatasetTable, store: &RegionStore) -> Option<f64> {
    let levels: Vec<f64> = match data.column_index(LEVEL_COLUMN) {
        Some(idx) => data
            .rows()
            .iter()
            .filter_map(|r| r.values.get(idx).and_then(|v| v.as_f64()))
            .collect(),
        None => data
            .rows()
            .iter()
            .filter_map(|r| store.get(&r.key.id).ok())
            .map(|region| region.level as f64)
            .collect(),
    };
    if levels.is_empty() {
        None
    } else {
        Some(levels.iter().sum::<f64>() / levels.len() as f64)
    }
}
