//! Hierarchical fill engine
//!
//! Upward policies run a layered fixpoint per relation: the first frontier
//! is the whole input table, every following frontier is only the layer of
//! parents computed in the previous step, and a parent is never computed
//! twice. INHERIT columns run the mirror-image downward pass once every
//! upward pass is done, so rows created by inheritance never block an
//! upward fill.
//!
//! Row ids are canonicalised against the store first; ids the store does
//! not know are a schema error.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::AggregationConfig;
use crate::error::{Result, SchemaError, StructuralError};
use crate::region::RegionStore;
use crate::table::{
    DatasetTable, FillPolicy, MissingPolicy, Row, RowKey, ValidationError, Value,
    POPULATION_COLUMN,
};

use super::functions;
use super::policy::{PolicyGroup, PolicyPlan};

/// Iterations allowed beyond the store's maximum level
pub const ITERATION_MARGIN: usize = 2;

/// Relation(s) an aggregation runs over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationSelector {
    /// One named relation
    One(String),
    /// Every configured relation, in configured order, cumulatively
    All,
}

impl RelationSelector {
    /// Parse a relation name; `all` and `*` select every relation
    pub fn parse(relation: &str) -> Self {
        match relation.trim() {
            "all" | "*" => RelationSelector::All,
            other => RelationSelector::One(other.to_string()),
        }
    }
}

impl From<&str> for RelationSelector {
    fn from(relation: &str) -> Self {
        Self::parse(relation)
    }
}

/// Fills dataset tables along the hierarchies of a store snapshot
#[derive(Debug, Clone)]
pub struct AggregationEngine<'a> {
    store: &'a RegionStore,
    relation_order: Vec<String>,
    iteration_margin: usize,
}

impl<'a> AggregationEngine<'a> {
    /// Create an engine with the default relation order
    pub fn new(store: &'a RegionStore) -> Self {
        Self::with_config(store, &AggregationConfig::default())
    }

    /// Create an engine from configuration
    pub fn with_config(store: &'a RegionStore, config: &AggregationConfig) -> Self {
        Self {
            store,
            relation_order: config.relation_order.clone(),
            iteration_margin: config.iteration_margin,
        }
    }

    /// Maximum number of layers computed for a relation
    ///
    /// The deeper of the primary tree and the relation itself, plus the
    /// configured margin.
    pub fn iteration_bound(&self, relation: &str) -> usize {
        let depth = (self.store.max_level() as usize).max(self.store.relation_depth(relation));
        depth + self.iteration_margin
    }

    /// Relations visited for a selector, in order
    pub fn relations(&self, selector: &RelationSelector) -> Vec<String> {
        match selector {
            RelationSelector::One(relation) => vec![relation.clone()],
            RelationSelector::All => self.relation_order.clone(),
        }
    }

    /// Fill a table along one relation or, cumulatively, along all of them
    ///
    /// The input is never modified. The output holds the input rows first,
    /// then synthesised rows in discovery order.
    pub fn aggregate(
        &self,
        table: &DatasetTable,
        selector: &RelationSelector,
        plan: &PolicyPlan,
    ) -> Result<DatasetTable> {
        plan.check_table(table)?;
        let mut current = self.canonicalize(table)?;
        reject_duplicates(&current)?;
        if plan.is_noop() {
            return Ok(current);
        }

        let relations: Vec<String> = self
            .relations(selector)
            .into_iter()
            .filter(|relation| {
                let present = self.store.has_relation(relation);
                if !present {
                    warn!(relation = %relation, table = table.name(), "Relation has no edges");
                }
                present
            })
            .collect();

        for relation in &relations {
            let before = current.len();
            current = self.fill_relation(&current, relation, plan)?;
            info!(
                relation = %relation,
                table = table.name(),
                synthesized = current.len() - before,
                "Relation pass complete"
            );
        }

        if let Some(group) = plan.inherit_group() {
            for relation in &relations {
                let before = current.len();
                current = self.fill_downward(current, relation, group)?;
                info!(
                    relation = %relation,
                    table = table.name(),
                    created = current.len() - before,
                    "Inheritance pass complete"
                );
            }
        }
        Ok(current)
    }

    /// Rewrite row ids to their canonical spelling
    fn canonicalize(&self, table: &DatasetTable) -> Result<DatasetTable> {
        let mut unknown = Vec::new();
        let table = table.clone().map_ids(|id| match self.store.canonical_id(id) {
            Some(canonical) => Ok(canonical.clone()),
            None => {
                unknown.push(ValidationError::UnknownRegion { id: id.to_string() });
                Ok(id.to_string())
            },
        })?;
        if unknown.is_empty() {
            return Ok(table);
        }
        Err(SchemaError {
            table: table.name().to_string(),
            errors: unknown,
        }
        .into())
    }

    fn fill_relation(
        &self,
        table: &DatasetTable,
        relation: &str,
        plan: &PolicyPlan,
    ) -> Result<DatasetTable> {
        let mut result = table.clone();

        for group in plan.upward_groups() {
            let mut columns = group.column_names();
            if group.needs_weights() {
                columns.push(POPULATION_COLUMN.to_string());
            }
            let sub = table.project(&columns)?;
            let filled = self.fill_upward(sub, relation, group)?;
            let filled = filled.project(&group.column_names())?;
            result = result.outer_join(&filled);
        }
        Ok(result)
    }

    /// Parent of `id` in `relation`, failing on malformed nodes
    fn single_parent(&self, id: &str, relation: &str) -> Result<Option<&'a str>> {
        if let Some(cycle) = self.store.cycle_through(id, relation) {
            return Err(StructuralError::Cycle {
                relation: relation.to_string(),
                nodes: cycle.to_vec(),
            }
            .into());
        }
        match self.store.relation_parents(id, relation) {
            [] => Ok(None),
            [parent] => Ok(Some(parent.as_str())),
            parents => Err(StructuralError::DuplicateParent {
                relation: relation.to_string(),
                child: id.to_string(),
                parents: parents.to_vec(),
            }
            .into()),
        }
    }

    fn fill_upward(
        &self,
        sub: DatasetTable,
        relation: &str,
        group: &PolicyGroup,
    ) -> Result<DatasetTable> {
        let bound = self.iteration_bound(relation);
        let weight_idx = group
            .needs_weights()
            .then_some(group.columns.len());

        let mut done: HashSet<RowKey> = sub.keys().cloned().collect();
        let mut accumulated = sub.clone();
        let mut frontier = sub;
        let mut iteration = 0usize;

        loop {
            let (order, layer) = {
                let mut order: Vec<RowKey> = Vec::new();
                let mut children: HashMap<RowKey, Vec<&Row>> = HashMap::new();
                for row in frontier.rows() {
                    let Some(parent) = self.single_parent(&row.key.id, relation)? else {
                        continue;
                    };
                    let parent_key = row.key.rekey(parent);
                    if done.contains(&parent_key) {
                        continue;
                    }
                    children
                        .entry(parent_key.clone())
                        .or_insert_with(|| {
                            order.push(parent_key);
                            Vec::new()
                        })
                        .push(row);
                }

                if order.is_empty() {
                    break;
                }
                iteration += 1;
                if iteration > bound {
                    return Err(StructuralError::IterationBoundExceeded {
                        relation: relation.to_string(),
                        bound,
                        pending: order.into_iter().map(|k| k.id).collect(),
                    }
                    .into());
                }

                let mut layer = frontier.empty_like();
                for parent_key in &order {
                    let rows = children.get(parent_key).map(Vec::as_slice).unwrap_or(&[]);
                    let mut values = Vec::with_capacity(frontier.columns().len());
                    for (idx, column) in group.columns.iter().enumerate() {
                        values.push(reduce_column(
                            frontier.name(),
                            rows,
                            idx,
                            column.missing,
                            group.fill,
                            &column.column,
                            weight_idx,
                        )?);
                    }
                    if let Some(w) = weight_idx {
                        values.push(reduce_column(
                            frontier.name(),
                            rows,
                            w,
                            MissingPolicy::Skip,
                            FillPolicy::SumChildren,
                            POPULATION_COLUMN,
                            None,
                        )?);
                    }
                    layer.push(parent_key.clone(), values)?;
                }
                (order, layer)
            };

            debug!(
                relation,
                policy = %group.fill,
                iteration,
                parents = layer.len(),
                "Computed parent layer"
            );
            done.extend(order);
            accumulated.append(layer.clone())?;
            frontier = layer;
        }

        Ok(accumulated)
    }

    fn fill_downward(
        &self,
        table: DatasetTable,
        relation: &str,
        group: &PolicyGroup,
    ) -> Result<DatasetTable> {
        let bound = self.iteration_bound(relation);
        let width = table.columns().len();
        let targets: Vec<usize> = group
            .columns
            .iter()
            .filter_map(|c| table.column_index(&c.column))
            .collect();

        let mut cells: HashMap<RowKey, Vec<Value>> = HashMap::new();
        let mut order: Vec<RowKey> = Vec::new();
        for row in table.rows() {
            order.push(row.key.clone());
            cells.insert(row.key.clone(), row.values.clone());
        }
        let original = order.len();

        let mut frontier: Vec<RowKey> = order
            .iter()
            .filter(|k| targets.iter().any(|&t| !cells[*k][t].is_null()))
            .cloned()
            .collect();
        let mut iteration = 0usize;

        while !frontier.is_empty() {
            let mut next: Vec<RowKey> = Vec::new();
            for parent_key in &frontier {
                let parent_values: Vec<Value> =
                    targets.iter().map(|&t| cells[parent_key][t].clone()).collect();
                for child in self.store.relation_children(&parent_key.id, relation) {
                    self.single_parent(child, relation)?;
                    let child_key = parent_key.rekey(child);
                    let entry = cells.entry(child_key.clone()).or_insert_with(|| {
                        order.push(child_key.clone());
                        vec![Value::Null; width]
                    });
                    let mut changed = false;
                    for (&t, value) in targets.iter().zip(&parent_values) {
                        if entry[t].is_null() && !value.is_null() {
                            entry[t] = value.clone();
                            changed = true;
                        }
                    }
                    if changed {
                        next.push(child_key);
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            iteration += 1;
            if iteration > bound {
                return Err(StructuralError::IterationBoundExceeded {
                    relation: relation.to_string(),
                    bound,
                    pending: next.into_iter().map(|k| k.id).collect(),
                }
                .into());
            }
            debug!(relation, iteration, children = next.len(), "Inherited layer");
            frontier = next;
        }

        let mut out = table.empty_like();
        for key in order {
            let values = cells.remove(&key).unwrap_or_else(|| vec![Value::Null; width]);
            out.push(key, values)?;
        }
        debug!(
            relation,
            created = out.len() - original,
            "Inherited values from parents"
        );
        Ok(out)
    }
}

fn reject_duplicates(table: &DatasetTable) -> Result<()> {
    let duplicates = table.duplicate_keys();
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(SchemaError {
        table: table.name().to_string(),
        errors: duplicates
            .into_iter()
            .map(|(key, count)| ValidationError::DuplicateKey {
                key: key.to_string(),
                count,
            })
            .collect(),
    }
    .into())
}

/// Reduce one column over a parent's children
fn reduce_column(
    table: &str,
    rows: &[&Row],
    idx: usize,
    missing: MissingPolicy,
    fill: FillPolicy,
    column: &str,
    weight_idx: Option<usize>,
) -> Result<Value> {
    let mut values = Vec::with_capacity(rows.len());
    let mut weights = Vec::new();
    for row in rows {
        let value = row.values.get(idx).cloned().unwrap_or_default();
        let value = match value {
            Value::Null => match missing {
                MissingPolicy::Skip => continue,
                MissingPolicy::Zero => Value::Int(0),
            },
            v if v.is_numeric() => v,
            other => {
                return Err(SchemaError {
                    table: table.to_string(),
                    errors: vec![ValidationError::TypeMismatch {
                        column: column.to_string(),
                        key: row.key.to_string(),
                        expected: "numeric".to_string(),
                        actual: other.type_name().to_string(),
                    }],
                }
                .into())
            },
        };
        values.push(value);
        if let Some(w) = weight_idx {
            weights.push(row.values.get(w).cloned().unwrap_or_default());
        }
    }
    Ok(functions::reduce(fill, &values, &weights))
}
