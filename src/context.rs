//! Query context
//!
//! A [`Context`] bundles everything a query needs: an immutable region
//! snapshot, the resolver answering for it, the dataset schemas, the
//! explicit column registry and the table store. It is built once at
//! startup and passed to every call; nothing here is global.
//!
//! [`SharedContext`] lets long-running processes swap in a repopulated
//! snapshot atomically while in-flight queries keep the one they started
//! with.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::aggregation::{AggregationEngine, PolicyPlan, RelationSelector};
use crate::collector::ChunkCollector;
use crate::config::{AggregationConfig, CollectorConfig, Config, ResolverConfig};
use crate::error::{Result, SchemaError};
use crate::region::{RegionFilter, RegionStore};
use crate::resolver::CodeResolver;
use crate::store::{JsonDirStore, Store};
use crate::table::{
    DatasetTable, FillPolicy, RowKey, SchemaRegistry, ValidationError, Value,
};
use crate::types::{Region, RegionId};

// ============================================================================
// Column registry
// ============================================================================

/// Built-in region fields exposed as columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionField {
    /// Canonical id
    Id,
    /// Display name
    Name,
    /// Type tag
    Type,
    /// Subtype
    Subtype,
    /// Short code
    ShortCode,
    /// Long code
    LongCode,
    /// Numeric code
    NumericCode,
    /// Enclosing country
    CountryId,
    /// Primary parent
    ParentId,
    /// Depth in the primary hierarchy
    Level,
}

impl RegionField {
    /// Every built-in field with its column name
    pub const ALL: [(&'static str, RegionField); 10] = [
        ("id", RegionField::Id),
        ("name", RegionField::Name),
        ("type", RegionField::Type),
        ("subtype", RegionField::Subtype),
        ("short_code", RegionField::ShortCode),
        ("long_code", RegionField::LongCode),
        ("numeric_code", RegionField::NumericCode),
        ("country_id", RegionField::CountryId),
        ("parent_id", RegionField::ParentId),
        ("level", RegionField::Level),
    ];

    /// Read the field from a region
    pub fn read(&self, region: &Region) -> Value {
        let text = |v: &Option<String>| Value::from(v.clone());
        match self {
            RegionField::Id => Value::from(region.id.as_str()),
            RegionField::Name => Value::from(region.name.as_str()),
            RegionField::Type => Value::from(region.kind.as_str()),
            RegionField::Subtype => text(&region.subtype),
            RegionField::ShortCode => text(&region.short_code),
            RegionField::LongCode => text(&region.long_code),
            RegionField::NumericCode => text(&region.numeric_code),
            RegionField::CountryId => text(&region.country_id),
            RegionField::ParentId => text(&region.parent_id),
            RegionField::Level => Value::Int(i64::from(region.level)),
        }
    }
}

/// How a named column is produced for a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAccessor {
    /// A field of the region record
    Field(RegionField),
    /// A column of a canonical dataset table keyed by region id
    Table {
        /// Dataset name
        table: String,
        /// Column within the dataset
        column: String,
    },
}

/// Explicit map from column name to accessor
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    accessors: BTreeMap<String, ColumnAccessor>,
}

impl ColumnRegistry {
    /// Registry holding only the built-in region fields
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for (name, field) in RegionField::ALL {
            registry.register(name, ColumnAccessor::Field(field));
        }
        registry
    }

    /// Built-ins plus every column of every region-keyed dataset
    ///
    /// Built-in names win over dataset columns; among datasets the first
    /// declaration wins.
    pub fn from_schemas(schemas: &SchemaRegistry) -> Self {
        let mut registry = Self::with_builtins();
        for name in schemas.names() {
            let Some(schema) = schemas.get(&name) else {
                continue;
            };
            if schema.key.secondary().is_some() {
                continue;
            }
            for column in &schema.columns {
                registry
                    .accessors
                    .entry(column.name.clone())
                    .or_insert_with(|| ColumnAccessor::Table {
                        table: schema.name.clone(),
                        column: column.name.clone(),
                    });
            }
        }
        registry
    }

    /// Register (or replace) an accessor
    pub fn register(&mut self, name: impl Into<String>, accessor: ColumnAccessor) {
        self.accessors.insert(name.into(), accessor);
    }

    /// Accessor of a column
    pub fn get(&self, name: &str) -> Option<&ColumnAccessor> {
        self.accessors.get(name)
    }

    /// Registered column names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.accessors.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// Context
// ============================================================================

/// Immutable query context
pub struct Context {
    resolver: CodeResolver,
    schemas: SchemaRegistry,
    columns: ColumnRegistry,
    tables: Arc<dyn Store>,
    aggregation: AggregationConfig,
    collector: CollectorConfig,
    resolver_config: ResolverConfig,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("resolver", &self.resolver)
            .field("datasets", &self.schemas.names())
            .field("columns", &self.columns.names().len())
            .finish()
    }
}

impl Context {
    /// Build a context around an existing region snapshot
    pub fn new(regions: RegionStore, tables: Arc<dyn Store>, config: &Config) -> Result<Self> {
        config.validate()?;
        let schemas = config.schema_registry();
        Ok(Self {
            resolver: CodeResolver::with_config(Arc::new(regions), &config.resolver),
            columns: ColumnRegistry::from_schemas(&schemas),
            schemas,
            tables,
            aggregation: config.aggregation.clone(),
            collector: config.collector.clone(),
            resolver_config: config.resolver.clone(),
        })
    }

    /// Open the configured data directory and populate the snapshot from it
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = JsonDirStore::open(&config.store.data_dir)?;
        let regions = store.populate_region_store(config.aggregation.repair_levels)?;
        Self::new(regions, Arc::new(store), config)
    }

    /// Same configuration, fresh snapshot from the table store
    pub fn repopulated(&self) -> Result<Self> {
        let regions = self
            .tables
            .populate_region_store(self.aggregation.repair_levels)?;
        Ok(Self {
            resolver: CodeResolver::with_config(Arc::new(regions), &self.resolver_config),
            schemas: self.schemas.clone(),
            columns: self.columns.clone(),
            tables: Arc::clone(&self.tables),
            aggregation: self.aggregation.clone(),
            collector: self.collector.clone(),
            resolver_config: self.resolver_config.clone(),
        })
    }

    /// Region snapshot
    pub fn regions(&self) -> &RegionStore {
        self.resolver.store()
    }

    /// Code resolver bound to the snapshot
    pub fn resolver(&self) -> &CodeResolver {
        &self.resolver
    }

    /// Declared dataset schemas
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Column registry
    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    /// Table store
    pub fn tables(&self) -> &dyn Store {
        self.tables.as_ref()
    }

    /// Resolve a reference to a canonical id
    pub fn resolve(&self, reference: &str) -> Result<RegionId> {
        self.resolver.resolve(reference)
    }

    /// Region denoted by a reference
    pub fn region(&self, reference: &str) -> Result<&Region> {
        self.resolver.region(reference)
    }

    /// Children of a region in a relation
    pub fn children(&self, reference: &str, relation: &str) -> Result<Vec<RegionId>> {
        let id = self.resolve(reference)?;
        self.regions().children(&id, relation)
    }

    /// Rows of a canonical table whose region matches the filter
    ///
    /// Rows of regions missing from the snapshot only survive an empty
    /// filter.
    pub fn query_table(&self, name: &str, filter: &RegionFilter) -> Result<DatasetTable> {
        let table = self.tables.load_table(name)?;
        if filter.is_empty() {
            return Ok(table);
        }
        let regions = self.regions();
        Ok(table.filter(|row| {
            regions
                .get(&row.key.id)
                .map(|region| filter.matches(region))
                .unwrap_or(false)
        }))
    }

    /// Fill a table along a relation (`"all"` for every configured one)
    pub fn aggregate(
        &self,
        table: &DatasetTable,
        relation: &str,
        policy_map: &BTreeMap<String, FillPolicy>,
    ) -> Result<DatasetTable> {
        let plan = PolicyPlan::from_policies(policy_map)?;
        AggregationEngine::with_config(self.regions(), &self.aggregation).aggregate(
            table,
            &RelationSelector::parse(relation),
            &plan,
        )
    }

    /// Table of the requested columns for the given regions
    ///
    /// Ids are resolved first, so any accepted reference works. Table-backed
    /// columns yield null for regions absent from their dataset.
    pub fn extra_columns(&self, ids: &[&str], names: &[&str]) -> Result<DatasetTable> {
        let mut accessors = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.columns.get(name) {
                Some(accessor) => accessors.push(accessor),
                None => unknown.push(ValidationError::MissingColumn {
                    column: name.to_string(),
                }),
            }
        }
        if !unknown.is_empty() {
            return Err(SchemaError {
                table: "extra_columns".to_string(),
                errors: unknown,
            }
            .into());
        }

        let mut loaded: HashMap<&str, DatasetTable> = HashMap::new();
        for accessor in &accessors {
            if let ColumnAccessor::Table { table, .. } = accessor {
                if !loaded.contains_key(table.as_str()) {
                    loaded.insert(table.as_str(), self.tables.load_table(table)?);
                }
            }
        }

        let mut out = DatasetTable::new("extra_columns", names.iter().copied());
        for reference in ids {
            let region = self.region(reference)?;
            let values = accessors
                .iter()
                .map(|accessor| match accessor {
                    ColumnAccessor::Field(field) => field.read(region),
                    ColumnAccessor::Table { table, column } => loaded
                        .get(table.as_str())
                        .and_then(|t| t.value(&RowKey::region(region.id.as_str()), column))
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect();
            out.push(RowKey::region(region.id.as_str()), values)?;
        }
        Ok(out)
    }

    /// Collector bound to this context's resolver and schemas
    pub fn collector(&self) -> ChunkCollector<'_> {
        ChunkCollector::new(&self.resolver, &self.schemas)
            .with_config(self.collector.clone())
            .with_aggregation(self.aggregation.clone())
    }
}

// ============================================================================
// Shared context
// ============================================================================

/// Atomically swappable context
#[derive(Debug, Clone)]
pub struct SharedContext {
    inner: Arc<RwLock<Arc<Context>>>,
}

impl SharedContext {
    /// Wrap a context
    pub fn new(context: Context) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(context))),
        }
    }

    /// Current snapshot; stays valid across later swaps
    pub fn load(&self) -> Arc<Context> {
        Arc::clone(&self.inner.read())
    }

    /// Install a new context, returning the previous one
    ///
    /// The previous resolver's memo is dropped so stale answers cannot be
    /// served through it.
    pub fn swap(&self, context: Context) -> Arc<Context> {
        let previous = std::mem::replace(&mut *self.inner.write(), Arc::new(context));
        previous.resolver.invalidate_cache();
        info!(regions = self.load().regions().len(), "Context swapped");
        previous
    }

    /// Rebuild the snapshot from the table store and swap it in
    pub fn repopulate(&self) -> Result<()> {
        let fresh = self.load().repopulated()?;
        self.swap(fresh);
        Ok(())
    }
}

impl From<Context> for SharedContext {
    fn from(context: Context) -> Self {
        Self::new(context)
    }
}
