//! Fill-policy plans
//!
//! A [`PolicyPlan`] decomposes a table's per-column fill policies into
//! groups of columns sharing one policy. Each group is aggregated as an
//! independent sub-table and the results are joined back on the row key.
//! Plans are compiled at setup time; policies that cannot be decomposed
//! this way are configuration errors.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::table::{
    ColumnType, DatasetTable, FillPolicy, MissingPolicy, TableSchema, POPULATION_COLUMN,
};

/// Fill settings of one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPolicy {
    /// Column name
    pub column: String,
    /// Fill policy
    pub fill: FillPolicy,
    /// Treatment of missing child values
    pub missing: MissingPolicy,
}

/// Columns sharing one fill policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGroup {
    /// Shared fill policy
    pub fill: FillPolicy,
    /// Member columns, in table order
    pub columns: Vec<ColumnPolicy>,
}

impl PolicyGroup {
    /// Names of the member columns
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column.clone()).collect()
    }

    /// Whether the group needs the population column as weight
    pub fn needs_weights(&self) -> bool {
        self.fill == FillPolicy::MeanPopWeighted
    }
}

/// Compiled fill policies of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyPlan {
    upward: Vec<PolicyGroup>,
    inherit: Option<PolicyGroup>,
}

impl PolicyPlan {
    /// Compile the policies declared by a schema
    ///
    /// Column types are known here, so numeric policies on text columns and
    /// fractional policies on integer columns are rejected.
    pub fn from_schema(schema: &TableSchema) -> Result<Self> {
        let mut policies: BTreeMap<String, (FillPolicy, MissingPolicy)> = BTreeMap::new();
        let mut order = Vec::new();

        for column in &schema.columns {
            if let Some((existing, _)) = policies.get(&column.name) {
                if *existing != column.fill {
                    return Err(conflict(format!(
                        "column '{}' of '{}' declared with policies {} and {}",
                        column.name, schema.name, existing, column.fill
                    )));
                }
                continue;
            }
            if column.fill.requires_numeric() && !column.column_type.is_numeric() {
                return Err(conflict(format!(
                    "column '{}' of '{}' is {} but {} needs numbers",
                    column.name,
                    schema.name,
                    column.column_type.name(),
                    column.fill
                )));
            }
            if column.fill.produces_float() && column.column_type != ColumnType::Float {
                return Err(conflict(format!(
                    "column '{}' of '{}' is {} but {} produces fractional values",
                    column.name,
                    schema.name,
                    column.column_type.name(),
                    column.fill
                )));
            }
            policies.insert(column.name.clone(), (column.fill, column.missing));
            order.push(column.name.clone());
        }

        Self::compile(&schema.name, order, &policies)
    }

    /// Compile a bare column -> policy map (missing values skipped)
    pub fn from_policies(policies: &BTreeMap<String, FillPolicy>) -> Result<Self> {
        let full: BTreeMap<String, (FillPolicy, MissingPolicy)> = policies
            .iter()
            .map(|(c, p)| (c.clone(), (*p, MissingPolicy::Skip)))
            .collect();
        Self::compile("<policy map>", policies.keys().cloned().collect(), &full)
    }

    /// Plan applying one policy to every listed column
    pub fn uniform<I, S>(policy: FillPolicy, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let map: BTreeMap<String, FillPolicy> =
            columns.into_iter().map(|c| (c.into(), policy)).collect();
        Self::from_policies(&map)
    }

    fn compile(
        table: &str,
        order: Vec<String>,
        policies: &BTreeMap<String, (FillPolicy, MissingPolicy)>,
    ) -> Result<Self> {
        let mut groups: BTreeMap<FillPolicy, PolicyGroup> = BTreeMap::new();
        for column in order {
            let Some(&(fill, missing)) = policies.get(&column) else {
                continue;
            };
            if fill == FillPolicy::None {
                continue;
            }
            groups
                .entry(fill)
                .or_insert_with(|| PolicyGroup {
                    fill,
                    columns: Vec::new(),
                })
                .columns
                .push(ColumnPolicy {
                    column,
                    fill,
                    missing,
                });
        }

        if let Some(weighted) = groups.get(&FillPolicy::MeanPopWeighted) {
            if weighted.columns.iter().any(|c| c.column == POPULATION_COLUMN) {
                return Err(conflict(format!(
                    "'{}' cannot weigh itself in '{}'",
                    POPULATION_COLUMN, table
                )));
            }
            let population = policies.get(POPULATION_COLUMN).map(|(fill, _)| *fill);
            if population != Some(FillPolicy::SumChildren) {
                return Err(conflict(format!(
                    "{} in '{}' needs a '{}' column filled with {}",
                    FillPolicy::MeanPopWeighted,
                    table,
                    POPULATION_COLUMN,
                    FillPolicy::SumChildren
                )));
            }
        }

        let inherit = groups.remove(&FillPolicy::Inherit);
        Ok(Self {
            upward: groups.into_values().collect(),
            inherit,
        })
    }

    /// Groups filled from children, ordered by policy
    pub fn upward_groups(&self) -> &[PolicyGroup] {
        &self.upward
    }

    /// Columns filled from parents
    pub fn inherit_group(&self) -> Option<&PolicyGroup> {
        self.inherit.as_ref()
    }

    /// Whether the plan leaves every table unchanged
    pub fn is_noop(&self) -> bool {
        self.upward.is_empty() && self.inherit.is_none()
    }

    /// Every column the plan touches
    pub fn columns(&self) -> Vec<&str> {
        self.upward
            .iter()
            .chain(self.inherit.iter())
            .flat_map(|g| g.columns.iter().map(|c| c.column.as_str()))
            .collect()
    }

    /// Check that a table carries every column the plan needs
    pub fn check_table(&self, table: &DatasetTable) -> Result<()> {
        let mut required = self.columns();
        if self.upward.iter().any(PolicyGroup::needs_weights) {
            required.push(POPULATION_COLUMN);
        }
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|c| table.column_index(c).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(conflict(format!(
                "table '{}' lacks columns {:?} named by its fill policies",
                table.name(),
                missing
            )))
        }
    }
}

fn conflict(msg: String) -> Error {
    Error::Configuration(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnSchema;

    #[test]
    fn test_groups_by_policy() {
        let schema = TableSchema::new("healthcare")
            .with_column(
                ColumnSchema::new("icu", ColumnType::Integer).with_fill(FillPolicy::SumChildren),
            )
            .with_column(
                ColumnSchema::new("beds", ColumnType::Integer).with_fill(FillPolicy::SumChildren),
            )
            .with_column(
                ColumnSchema::new("peak", ColumnType::Float).with_fill(FillPolicy::MaxChildren),
            )
            .with_column(ColumnSchema::new("region", ColumnType::Text).with_fill(FillPolicy::Inherit))
            .with_column(ColumnSchema::new("notes", ColumnType::Text));

        let plan = PolicyPlan::from_schema(&schema).unwrap();
        assert_eq!(plan.upward_groups().len(), 2);
        assert_eq!(plan.upward_groups()[0].column_names(), vec!["icu", "beds"]);
        assert_eq!(plan.inherit_group().unwrap().column_names(), vec!["region"]);
        assert_eq!(plan.columns().len(), 4);
    }

    #[test]
    fn test_rejects_numeric_policy_on_text() {
        let schema = TableSchema::new("t").with_column(
            ColumnSchema::new("name", ColumnType::Text).with_fill(FillPolicy::SumChildren),
        );
        assert!(PolicyPlan::from_schema(&schema).is_err());
    }

    #[test]
    fn test_rejects_mean_on_integer() {
        let schema = TableSchema::new("t").with_column(
            ColumnSchema::new("beds", ColumnType::Integer).with_fill(FillPolicy::MeanChildren),
        );
        assert!(PolicyPlan::from_schema(&schema).is_err());
    }

    #[test]
    fn test_weighted_mean_needs_summed_population() {
        let mut map = BTreeMap::new();
        map.insert("age".to_string(), FillPolicy::MeanPopWeighted);
        assert!(PolicyPlan::from_policies(&map).is_err());

        map.insert(POPULATION_COLUMN.to_string(), FillPolicy::MaxChildren);
        assert!(PolicyPlan::from_policies(&map).is_err());

        map.insert(POPULATION_COLUMN.to_string(), FillPolicy::SumChildren);
        assert!(PolicyPlan::from_policies(&map).is_ok());
    }

    #[test]
    fn test_check_table() {
        let plan = PolicyPlan::uniform(FillPolicy::SumChildren, ["population"]).unwrap();
        let table = DatasetTable::new("t", ["beds"]);
        let err = plan.check_table(&table).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(PolicyPlan::uniform(FillPolicy::None, ["beds"]).unwrap().is_noop());
    }
}
