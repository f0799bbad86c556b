//! Error types for the region registry

use thiserror::Error;

use crate::table::ValidationError;
use crate::types::RegionId;

/// Main error type for the registry
#[derive(Error, Debug)]
pub enum Error {
    /// Reference resolution or region lookup failed
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// Hierarchy is cyclic, has duplicate parents or inconsistent levels
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// A dataset table does not match its declared schema
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Storage backend error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Raw data source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration error (conflicting fill policies, invalid settings)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Taxonomy name printed by front-ends next to the message
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Resolve(ResolveError::NotFound { .. }) => "NotFound",
            Error::Resolve(ResolveError::Ambiguous { .. }) => "AmbiguousReference",
            Error::Structural(_) => "StructuralError",
            Error::Schema(_) => "SchemaError",
            Error::Store(_) => "StoreError",
            Error::Source(_) => "SourceError",
            Error::Configuration(_) => "ConfigurationError",
        }
    }

    /// Shortcut for a not-found error on the given reference
    pub fn not_found(reference: impl Into<String>) -> Self {
        Error::Resolve(ResolveError::NotFound {
            reference: reference.into(),
        })
    }
}

/// Resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No region matches the reference
    #[error("region not found: {reference:?}")]
    NotFound {
        /// The reference exactly as given by the caller
        reference: String,
    },

    /// Several regions match and none can be ranked first
    #[error("ambiguous reference {reference:?}: candidates {candidates:?}")]
    Ambiguous {
        /// The reference exactly as given by the caller
        reference: String,
        /// Every matching region id
        candidates: Vec<RegionId>,
    },
}

/// Hierarchy structure errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// Nodes participate in a cycle within one relation
    #[error("cycle in relation '{relation}' through {nodes:?}")]
    Cycle {
        /// Relation label
        relation: String,
        /// Nodes on the cycle
        nodes: Vec<RegionId>,
    },

    /// A node has more than one parent within one relation
    #[error("'{child}' has several parents in relation '{relation}': {parents:?}")]
    DuplicateParent {
        /// Relation label
        relation: String,
        /// The offending child
        child: RegionId,
        /// All of its parents in this relation
        parents: Vec<RegionId>,
    },

    /// Declared level disagrees with the primary parent
    #[error("level of '{id}' is {declared}, expected {expected} (parent '{parent}')")]
    LevelMismatch {
        /// Region id
        id: RegionId,
        /// Primary parent id
        parent: RegionId,
        /// Level found in the input
        declared: u32,
        /// `level(parent) + 1`
        expected: u32,
    },

    /// Primary parent does not exist
    #[error("'{id}' references unknown parent '{parent}'")]
    UnknownParent {
        /// Region id
        id: RegionId,
        /// Missing parent id
        parent: RegionId,
    },

    /// Level inference walked past the bound without reaching a known level
    #[error("parent chain of '{id}' exceeds {bound} steps, circular parent chain?")]
    ParentChainTooLong {
        /// Region whose level was being inferred
        id: RegionId,
        /// Walk bound
        bound: usize,
    },

    /// More than one region without a primary parent
    #[error("several roots in primary hierarchy: {roots:?}")]
    MultipleRoots {
        /// Regions with an empty parent id
        roots: Vec<RegionId>,
    },

    /// The same id was registered twice
    #[error("duplicate region id '{0}'")]
    DuplicateRegion(RegionId),

    /// Aggregation exceeded its iteration bound
    #[error("relation '{relation}' still produced rows after {bound} iterations (pending: {pending:?})")]
    IterationBoundExceeded {
        /// Relation label
        relation: String,
        /// Iteration bound derived from the maximum level
        bound: usize,
        /// Ids of the layer still pending when the bound was hit
        pending: Vec<RegionId>,
    },
}

/// Schema validation failure for one table
#[derive(Error, Debug, Clone)]
#[error("table '{table}': {}", format_errors(.errors))]
pub struct SchemaError {
    /// Table (dataset) name
    pub table: String,
    /// Every problem found, in discovery order
    pub errors: Vec<ValidationError>,
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested table does not exist
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// No chunk was found for the requested dataset
    #[error("no chunk found for dataset '{0}'")]
    NoChunks(String),

    /// Region data has not been stored yet
    #[error("region snapshot not available: {0}")]
    MissingRegions(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid chunk name
    #[error("invalid chunk name: {0}")]
    InvalidChunkName(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Raw data source errors; opaque to the core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source may succeed if asked again later
    #[error("raw data unavailable (retryable): {0}")]
    Retryable(String),

    /// The source cannot produce data
    #[error("raw data unavailable: {0}")]
    Fatal(String),
}

impl SourceError {
    /// Whether the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Retryable(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::not_found("ZZ").kind(), "NotFound");
        let ambiguous = Error::from(ResolveError::Ambiguous {
            reference: "076".into(),
            candidates: vec!["BR".into(), "XB".into()],
        });
        assert_eq!(ambiguous.kind(), "AmbiguousReference");
        assert_eq!(
            Error::from(StructuralError::DuplicateRegion("BR".into())).kind(),
            "StructuralError"
        );
        assert_eq!(
            Error::Configuration("bad".into()).kind(),
            "ConfigurationError"
        );
    }

    #[test]
    fn test_messages_carry_offending_ids() {
        let err = Error::from(StructuralError::DuplicateParent {
            relation: "sus_region".into(),
            child: "BR-3550308".into(),
            parents: vec!["BR-SUS:35016".into(), "BR-SUS:35017".into()],
        });
        let msg = err.to_string();
        assert!(msg.contains("sus_region"));
        assert!(msg.contains("BR-3550308"));
    }

    #[test]
    fn test_source_error_retryable() {
        assert!(SourceError::Retryable("timeout".into()).is_retryable());
        assert!(!SourceError::Fatal("gone".into()).is_retryable());
    }
}
