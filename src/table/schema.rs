//! Dataset schemas and fill policies
//!
//! A schema declares, for one dataset, how rows are keyed, which columns
//! exist, their types, and how each column is filled for regions that have
//! no directly observed value.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Name of the weight column required by [`FillPolicy::MeanPopWeighted`]
pub const POPULATION_COLUMN: &str = "population";

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// UTF-8 string
    Text,
    /// Boolean
    Boolean,
}

impl ColumnType {
    /// Get the type name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "i64" => Some(ColumnType::Integer),
            "float" | "f64" | "double" => Some(ColumnType::Float),
            "text" | "string" | "str" => Some(ColumnType::Text),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            _ => None,
        }
    }

    /// Whether values of this type can be summed or averaged
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Strategy used to synthesise a column's value for regions without data
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillPolicy {
    /// Never synthesised
    #[default]
    None,
    /// Copied from the parent to children lacking a value
    Inherit,
    /// Sum of present children
    SumChildren,
    /// Maximum of present children
    MaxChildren,
    /// Minimum of present children
    MinChildren,
    /// Arithmetic mean of present children
    MeanChildren,
    /// Mean weighted by the children's `population`
    MeanPopWeighted,
    /// Median of present children
    MedianChildren,
}

impl FillPolicy {
    /// All policies, in declaration order
    pub const ALL: [FillPolicy; 8] = [
        FillPolicy::None,
        FillPolicy::Inherit,
        FillPolicy::SumChildren,
        FillPolicy::MaxChildren,
        FillPolicy::MinChildren,
        FillPolicy::MeanChildren,
        FillPolicy::MeanPopWeighted,
        FillPolicy::MedianChildren,
    ];

    /// Whether the policy rolls children values up to parents
    pub fn aggregates_children(&self) -> bool {
        !matches!(self, FillPolicy::None | FillPolicy::Inherit)
    }

    /// Whether the policy only makes sense on numeric columns
    pub fn requires_numeric(&self) -> bool {
        self.aggregates_children()
    }

    /// Whether the policy always produces fractional values
    pub fn produces_float(&self) -> bool {
        matches!(
            self,
            FillPolicy::MeanChildren | FillPolicy::MeanPopWeighted | FillPolicy::MedianChildren
        )
    }

    /// Upper-case name, as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            FillPolicy::None => "NONE",
            FillPolicy::Inherit => "INHERIT",
            FillPolicy::SumChildren => "SUM_CHILDREN",
            FillPolicy::MaxChildren => "MAX_CHILDREN",
            FillPolicy::MinChildren => "MIN_CHILDREN",
            FillPolicy::MeanChildren => "MEAN_CHILDREN",
            FillPolicy::MeanPopWeighted => "MEAN_POP_WEIGHTED",
            FillPolicy::MedianChildren => "MEDIAN_CHILDREN",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|p| p.name() == upper)
    }
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How missing child values take part in aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Children with a missing value are ignored
    #[default]
    Skip,
    /// Children with a missing value count as zero
    Zero,
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Expected type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether nulls are allowed
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Fill policy
    #[serde(default)]
    pub fill: FillPolicy,
    /// Treatment of missing child values during aggregation
    #[serde(default)]
    pub missing: MissingPolicy,
    /// Value assigned when a source omits the column
    #[serde(default)]
    pub default: Option<Value>,
    /// Description for documentation
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnSchema {
    /// Create a nullable column with no fill policy
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            fill: FillPolicy::None,
            missing: MissingPolicy::Skip,
            default: None,
            description: None,
        }
    }

    /// Create a non-nullable column
    pub fn required(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, column_type)
        }
    }

    /// Set the fill policy
    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    /// Set the missing-value policy
    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Primary key layout of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "secondary", rename_all = "snake_case")]
pub enum KeyKind {
    /// Unique by region id
    #[default]
    Region,
    /// Unique by (region id, secondary column), e.g. `(id, year)`
    RegionPeriod(String),
}

impl KeyKind {
    /// Names of the key columns
    pub fn columns(&self) -> Vec<&str> {
        match self {
            KeyKind::Region => vec!["id"],
            KeyKind::RegionPeriod(secondary) => vec!["id", secondary.as_str()],
        }
    }

    /// Name of the secondary key column, if any
    pub fn secondary(&self) -> Option<&str> {
        match self {
            KeyKind::Region => None,
            KeyKind::RegionPeriod(s) => Some(s),
        }
    }
}

/// Schema of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Dataset name
    pub name: String,
    /// Key layout
    #[serde(default)]
    pub key: KeyKind,
    /// Columns, in canonical order
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Create an empty schema keyed by region id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeyKind::Region,
            columns: Vec::new(),
        }
    }

    /// Key rows by (id, `secondary`)
    pub fn with_secondary_key(mut self, secondary: impl Into<String>) -> Self {
        self.key = KeyKind::RegionPeriod(secondary.into());
        self
    }

    /// Add a column
    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in canonical order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Declared fill policy of every column
    pub fn policy_map(&self) -> BTreeMap<String, FillPolicy> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.fill))
            .collect()
    }

    /// Whether any column is filled from children or parents
    pub fn has_fill_policies(&self) -> bool {
        self.columns.iter().any(|c| c.fill != FillPolicy::None)
    }
}

/// Registry of dataset schemas, built once at setup
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any schema with the same name
    pub fn register(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Builder-style registration
    pub fn with(mut self, schema: TableSchema) -> Self {
        self.register(schema);
        self
    }

    /// Get a schema by name
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.schemas.get(name)
    }

    /// Registered dataset names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered schemas
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
