//! Configuration management
//!
//! TOML configuration with per-field defaults and environment variable
//! overrides. Dataset schemas are declared in the same file as
//! `[[datasets]]` tables so that fill-policy conflicts are rejected when the
//! configuration is loaded, before any data is processed.
//!
//! ```toml
//! [store]
//! data_dir = "./mundi-data"
//!
//! [aggregation]
//! relation_order = ["default", "continent", "sus_region"]
//!
//! [[datasets]]
//! name = "healthcare"
//!
//! [[datasets.columns]]
//! name = "icu_capacity"
//! type = "integer"
//! fill = "SUM_CHILDREN"
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aggregation::PolicyPlan;
use crate::error::{Error, Result};
use crate::table::{SchemaRegistry, TableSchema};
use crate::types::{CONTINENT_RELATION, DEFAULT_RELATION, SUS_REGION_RELATION, WORLD_ID};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Code resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Aggregation engine settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Chunk collector settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dataset schemas
    #[serde(default)]
    pub datasets: Vec<TableSchema>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Resolver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Memoised references (0 disables the cache)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Tie-break order for ambiguous subdivision matches
    #[serde(default = "default_type_priority")]
    pub type_priority: Vec<String>,
}

/// Aggregation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Relations applied, in order, when aggregating over "all"
    #[serde(default = "default_relation_order")]
    pub relation_order: Vec<String>,

    /// Extra iterations allowed beyond the deepest hierarchy
    #[serde(default = "default_iteration_margin")]
    pub iteration_margin: usize,

    /// Repair inconsistent region levels instead of rejecting them
    #[serde(default)]
    pub repair_levels: bool,
}

/// Collector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Backfill ancestors after merging
    #[serde(default = "default_true")]
    pub backfill: bool,

    /// Scope of global chunks
    #[serde(default = "default_global_scope")]
    pub global_scope: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_data_dir() -> PathBuf { PathBuf::from("./mundi-data") }
fn default_cache_capacity() -> usize { 32_000 }
fn default_type_priority() -> Vec<String> {
    ["state", "city", "district", "region"].iter().map(|s| s.to_string()).collect()
}
fn default_relation_order() -> Vec<String> {
    [DEFAULT_RELATION, CONTINENT_RELATION, SUS_REGION_RELATION]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_iteration_margin() -> usize { 2 }
fn default_global_scope() -> String { WORLD_ID.to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

/// Chunk names are `<table>-[<suffix>-]<scope>`, so a dataset name may not
/// contain the separator
fn is_dataset_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('-')
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            type_priority: default_type_priority(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            relation_order: default_relation_order(),
            iteration_margin: default_iteration_margin(),
            repair_levels: false,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            backfill: true,
            global_scope: default_global_scope(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Store
        if let Ok(data_dir) = std::env::var("MUNDI_DATA_DIR") {
            self.store.data_dir = PathBuf::from(data_dir);
        }

        // Resolver
        if let Ok(capacity) = std::env::var("MUNDI_CACHE_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.resolver.cache_capacity = c;
            }
        }

        // Aggregation
        if let Ok(relations) = std::env::var("MUNDI_RELATIONS") {
            let order: Vec<String> = relations
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if !order.is_empty() {
                self.aggregation.relation_order = order;
            }
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.log_level = log_level;
        }
    }

    /// Validate configuration
    ///
    /// Every dataset schema is compiled into a policy plan, so conflicting
    /// fill policies surface here as configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(Error::Configuration("Data directory cannot be empty".to_string()));
        }

        if self.resolver.type_priority.is_empty() {
            return Err(Error::Configuration("Type priority cannot be empty".to_string()));
        }

        if self.aggregation.relation_order.is_empty() {
            return Err(Error::Configuration("Relation order cannot be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for relation in &self.aggregation.relation_order {
            if !seen.insert(relation) {
                return Err(Error::Configuration(format!(
                    "Relation '{}' listed twice in relation order",
                    relation
                )));
            }
        }

        if self.collector.global_scope.trim().is_empty() {
            return Err(Error::Configuration("Global scope cannot be empty".to_string()));
        }

        let mut names = HashSet::new();
        for schema in &self.datasets {
            if !is_dataset_name(&schema.name) {
                return Err(Error::Configuration(format!(
                    "Dataset name '{}' must be non-empty and contain no '-'",
                    schema.name
                )));
            }
            if !names.insert(&schema.name) {
                return Err(Error::Configuration(format!(
                    "Dataset '{}' declared twice",
                    schema.name
                )));
            }
            PolicyPlan::from_schema(schema)?;
        }

        Ok(())
    }

    /// Registry built from the declared dataset schemas
    pub fn schema_registry(&self) -> SchemaRegistry {
        self.datasets
            .iter()
            .cloned()
            .fold(SchemaRegistry::new(), SchemaRegistry::with)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }
}
