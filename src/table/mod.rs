//! Dataset tables keyed by region
//!
//! A [`DatasetTable`] is a small row-oriented table whose primary key is a
//! region id, optionally paired with a secondary key such as a year. Every
//! operation that changes the shape of a table returns a new table; the
//! aggregation engine and collector never mutate their inputs.
//!
//! # Example
//!
//! ```rust
//! use mundi::table::{DatasetTable, RowKey, Value};
//!
//! let mut table = DatasetTable::new("population", ["population"]);
//! table.push(RowKey::region("BR-DF"), vec![Value::Int(3_000_000)]).unwrap();
//! assert_eq!(table.len(), 1);
//! ```

pub mod schema;
pub mod validation;
pub mod value;

pub use schema::{
    ColumnSchema, ColumnType, FillPolicy, KeyKind, MissingPolicy, SchemaRegistry, TableSchema,
    POPULATION_COLUMN,
};
pub use validation::{
    assign_defaults, check_table, validate_schema, ValidationError, ValidationResult,
};
pub use value::{KeyPart, RowKey, Value};

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::RegionId;

/// One row of a dataset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Primary key
    pub key: RowKey,
    /// Cells, aligned with the table's columns
    pub values: Vec<Value>,
}

/// Table of values keyed by region id (and optional secondary key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetTable {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary_key: Option<String>,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl DatasetTable {
    /// Create an empty table keyed by region id
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            secondary_key: None,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Key rows by (id, `secondary`)
    pub fn with_secondary_key(mut self, secondary: impl Into<String>) -> Self {
        self.secondary_key = Some(secondary.into());
        self
    }

    /// Empty table with the same name, key layout and columns
    pub fn empty_like(&self) -> Self {
        Self {
            name: self.name.clone(),
            secondary_key: self.secondary_key.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
        }
    }

    /// Dataset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name of the secondary key column, if any
    pub fn secondary_key(&self) -> Option<&str> {
        self.secondary_key.as_deref()
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Append a row
    pub fn push(&mut self, key: RowKey, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(SchemaError {
                table: self.name.clone(),
                errors: vec![ValidationError::RowWidth {
                    key: key.to_string(),
                    expected: self.columns.len(),
                    actual: values.len(),
                }],
            }
            .into());
        }
        self.rows.push(Row { key, values });
        Ok(())
    }

    /// Last row with the given key
    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.iter().rev().find(|r| &r.key == key)
    }

    /// Cell at (key, column)
    pub fn value(&self, key: &RowKey, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.get(key).and_then(|r| r.values.get(idx))
    }

    /// Whether a row with the given key exists
    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.iter().any(|r| &r.key == key)
    }

    /// Iterate over row keys
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter().map(|r| &r.key)
    }

    /// Distinct region ids
    pub fn ids(&self) -> BTreeSet<RegionId> {
        self.rows.iter().map(|r| r.key.id.clone()).collect()
    }

    /// Position of the last row of every key
    pub fn key_index(&self) -> HashMap<&RowKey, usize> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| (&r.key, i))
            .collect()
    }

    /// Keys that appear more than once, with their multiplicity
    pub fn duplicate_keys(&self) -> Vec<(RowKey, usize)> {
        let mut counts: HashMap<&RowKey, usize> = HashMap::new();
        let mut order = Vec::new();
        for row in &self.rows {
            let count = counts.entry(&row.key).or_insert(0);
            if *count == 1 {
                order.push(&row.key);
            }
            *count += 1;
        }
        order
            .into_iter()
            .map(|k| (k.clone(), counts[k]))
            .collect()
    }

    /// Keep only the given columns, in the given order
    pub fn project(&self, columns: &[String]) -> Result<DatasetTable> {
        let mut positions = Vec::with_capacity(columns.len());
        let mut missing = Vec::new();
        for column in columns {
            match self.column_index(column) {
                Some(idx) => positions.push(idx),
                None => missing.push(ValidationError::MissingColumn {
                    column: column.clone(),
                }),
            }
        }
        if !missing.is_empty() {
            return Err(SchemaError {
                table: self.name.clone(),
                errors: missing,
            }
            .into());
        }

        let rows = self
            .rows
            .iter()
            .map(|r| Row {
                key: r.key.clone(),
                values: positions
                    .iter()
                    .map(|&i| r.values.get(i).cloned().unwrap_or_default())
                    .collect(),
            })
            .collect();

        Ok(DatasetTable {
            name: self.name.clone(),
            secondary_key: self.secondary_key.clone(),
            columns: columns.to_vec(),
            rows,
        })
    }

    /// Append the rows of `other`, aligning columns by name
    ///
    /// Columns missing on either side are filled with nulls; new columns from
    /// `other` are appended after the existing ones.
    pub fn append(&mut self, other: DatasetTable) -> Result<()> {
        if self.secondary_key != other.secondary_key {
            return Err(SchemaError {
                table: self.name.clone(),
                errors: vec![ValidationError::KeyMismatch {
                    expected: self.secondary_key.clone(),
                    actual: other.secondary_key,
                }],
            }
            .into());
        }

        for column in &other.columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.values.push(Value::Null);
                }
            }
        }

        let mapping: Vec<usize> = self
            .columns
            .iter()
            .map(|c| other.column_index(c).unwrap_or(usize::MAX))
            .collect();

        for mut row in other.rows {
            let values = mapping
                .iter()
                .map(|&i| {
                    row.values
                        .get_mut(i)
                        .map(std::mem::take)
                        .unwrap_or(Value::Null)
                })
                .collect();
            self.rows.push(Row {
                key: row.key,
                values,
            });
        }
        Ok(())
    }

    /// Concatenate tables in order
    pub fn concat(name: impl Into<String>, tables: Vec<DatasetTable>) -> Result<DatasetTable> {
        let mut iter = tables.into_iter();
        let mut out = match iter.next() {
            Some(first) => first.renamed(name),
            None => return Ok(DatasetTable::new(name, Vec::<String>::new())),
        };
        for table in iter {
            out.append(table)?;
        }
        Ok(out)
    }

    /// Drop rows whose key reappears later, keeping the last occurrence
    pub fn dedupe_keep_last(&self) -> DatasetTable {
        let last = self.key_index();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, r)| last.get(&r.key) == Some(i))
            .map(|(_, r)| r.clone())
            .collect();
        DatasetTable {
            rows,
            ..self.empty_like()
        }
    }

    /// Keep rows matching the predicate
    pub fn filter<F>(&self, predicate: F) -> DatasetTable
    where
        F: Fn(&Row) -> bool,
    {
        DatasetTable {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
            ..self.empty_like()
        }
    }

    /// Rewrite every row's region id
    pub fn map_ids<F>(mut self, mut f: F) -> Result<DatasetTable>
    where
        F: FnMut(&str) -> Result<RegionId>,
    {
        for row in &mut self.rows {
            row.key.id = f(&row.key.id)?;
        }
        Ok(self)
    }

    /// Outer join on the row key
    ///
    /// Keys of `self` keep their order and come first; keys only present in
    /// `other` follow in `other`'s order. Columns of `other` that `self`
    /// already has are filled from `other` only where `self` is null.
    pub fn outer_join(&self, other: &DatasetTable) -> DatasetTable {
        let mut columns = self.columns.clone();
        for column in &other.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        let width = columns.len();
        let other_pos: Vec<Option<usize>> =
            columns.iter().map(|c| other.column_index(c)).collect();

        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .map(|r| {
                let mut values = r.values.clone();
                values.resize(width, Value::Null);
                Row {
                    key: r.key.clone(),
                    values,
                }
            })
            .collect();
        let mut index: HashMap<RowKey, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), i))
            .collect();

        for row in &other.rows {
            let target = match index.get(&row.key) {
                Some(&i) => i,
                None => {
                    rows.push(Row {
                        key: row.key.clone(),
                        values: vec![Value::Null; width],
                    });
                    index.insert(row.key.clone(), rows.len() - 1);
                    rows.len() - 1
                },
            };
            for (col, pos) in other_pos.iter().enumerate() {
                if let Some(pos) = pos {
                    let cell = &mut rows[target].values[col];
                    if cell.is_null() {
                        *cell = row.values.get(*pos).cloned().unwrap_or_default();
                    }
                }
            }
        }

        DatasetTable {
            name: self.name.clone(),
            secondary_key: self.secondary_key.clone(),
            columns,
            rows,
        }
    }

    /// Sort rows by key
    pub fn sorted(mut self) -> DatasetTable {
        self.rows.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }

    /// Consume the table, returning its rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}
