//! Schema validation for dataset tables
//!
//! Validation never stops at the first problem: every missing column,
//! unexpected column, type mismatch, forbidden null and duplicate key is
//! collected into a [`ValidationResult`] so a data source author sees the
//! whole picture at once.

use std::fmt;

use crate::error::{Result, SchemaError};

use super::schema::TableSchema;
use super::value::Value;
use super::DatasetTable;

/// Validation error types
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A declared column is absent from the table
    MissingColumn {
        /// Column name
        column: String,
    },

    /// The table has a column the schema does not declare
    UnexpectedColumn {
        /// Column name
        column: String,
    },

    /// A cell does not match the declared column type
    TypeMismatch {
        /// Column name
        column: String,
        /// Row key, rendered
        key: String,
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Null in a non-nullable column
    NullValue {
        /// Column name
        column: String,
        /// Row key, rendered
        key: String,
    },

    /// Several rows share one primary key
    DuplicateKey {
        /// Row key, rendered
        key: String,
        /// Number of rows with that key
        count: usize,
    },

    /// Table and schema disagree on the secondary key column
    KeyMismatch {
        /// Secondary key declared by the schema
        expected: Option<String>,
        /// Secondary key carried by the table
        actual: Option<String>,
    },

    /// A row has no secondary key although the table requires one
    MissingSecondaryKey {
        /// Region id of the row
        id: String,
    },

    /// A row has a different number of cells than the table has columns
    RowWidth {
        /// Row key, rendered
        key: String,
        /// Number of columns
        expected: usize,
        /// Number of cells
        actual: usize,
    },

    /// A row id could not be resolved to a known region
    UnknownRegion {
        /// The id as found in the data
        id: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingColumn { column } => {
                write!(f, "missing column '{}'", column)
            },
            ValidationError::UnexpectedColumn { column } => {
                write!(f, "unexpected column '{}'", column)
            },
            ValidationError::TypeMismatch {
                column,
                key,
                expected,
                actual,
            } => write!(
                f,
                "column '{}' at {}: expected {}, got {}",
                column, key, expected, actual
            ),
            ValidationError::NullValue { column, key } => {
                write!(f, "column '{}' at {}: null in non-nullable column", column, key)
            },
            ValidationError::DuplicateKey { key, count } => {
                write!(f, "duplicate key {} ({} rows)", key, count)
            },
            ValidationError::KeyMismatch { expected, actual } => write!(
                f,
                "secondary key mismatch: expected {:?}, table has {:?}",
                expected, actual
            ),
            ValidationError::MissingSecondaryKey { id } => {
                write!(f, "row '{}' has no secondary key", id)
            },
            ValidationError::RowWidth {
                key,
                expected,
                actual,
            } => write!(f, "row {} has {} cells, expected {}", key, actual, expected),
            ValidationError::UnknownRegion { id } => write!(f, "unknown region '{}'", id),
        }
    }
}

/// Accumulated result of validating one table
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Errors found, in discovery order
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create an empty (valid) result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Whether no error was recorded
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a `SchemaError` for the given table when invalid
    pub fn into_result(self, table: &str) -> std::result::Result<(), SchemaError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError {
                table: table.to_string(),
                errors: self.errors,
            })
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "valid");
        }
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {}", error)?;
        }
        Ok(())
    }
}

/// Check a table against its schema without modifying it
pub fn check_table(schema: &TableSchema, table: &DatasetTable) -> ValidationResult {
    let mut result = ValidationResult::new();

    let expected_key = schema.key.secondary().map(str::to_string);
    if expected_key != table.secondary_key {
        result.add_error(ValidationError::KeyMismatch {
            expected: expected_key.clone(),
            actual: table.secondary_key.clone(),
        });
    }

    for column in &schema.columns {
        if table.column_index(&column.name).is_none() {
            result.add_error(ValidationError::MissingColumn {
                column: column.name.clone(),
            });
        }
    }
    for name in &table.columns {
        if schema.column(name).is_none() {
            result.add_error(ValidationError::UnexpectedColumn {
                column: name.clone(),
            });
        }
    }

    for row in &table.rows {
        if row.values.len() != table.columns.len() {
            result.add_error(ValidationError::RowWidth {
                key: row.key.to_string(),
                expected: table.columns.len(),
                actual: row.values.len(),
            });
            continue;
        }
        if expected_key.is_some() && row.key.secondary.is_none() {
            result.add_error(ValidationError::MissingSecondaryKey {
                id: row.key.id.clone(),
            });
        }
        for (name, value) in table.columns.iter().zip(&row.values) {
            let Some(column) = schema.column(name) else {
                continue;
            };
            if value.is_null() {
                if !column.nullable {
                    result.add_error(ValidationError::NullValue {
                        column: name.clone(),
                        key: row.key.to_string(),
                    });
                }
            } else if !value.matches(column.column_type) {
                result.add_error(ValidationError::TypeMismatch {
                    column: name.clone(),
                    key: row.key.to_string(),
                    expected: column.column_type.name().to_string(),
                    actual: value.type_name().to_string(),
                });
            }
        }
    }

    for (key, count) in table.duplicate_keys() {
        result.add_error(ValidationError::DuplicateKey {
            key: key.to_string(),
            count,
        });
    }

    result
}

/// Validate a table against its schema
///
/// On success the returned table has its columns in schema order and every
/// value coerced to its column's canonical type (integers stored in float
/// columns become floats).
pub fn validate_schema(schema: &TableSchema, table: DatasetTable) -> Result<DatasetTable> {
    check_table(schema, &table).into_result(&schema.name)?;

    let positions: Vec<usize> = schema
        .columns
        .iter()
        .filter_map(|c| table.column_index(&c.name))
        .collect();

    let DatasetTable {
        name,
        secondary_key,
        rows,
        ..
    } = table;

    let rows = rows
        .into_iter()
        .map(|mut row| {
            let values = positions
                .iter()
                .zip(&schema.columns)
                .map(|(&pos, column)| {
                    std::mem::take(&mut row.values[pos]).coerce(column.column_type)
                })
                .collect();
            super::Row {
                key: row.key,
                values,
            }
        })
        .collect();

    Ok(DatasetTable {
        name,
        secondary_key,
        columns: schema.column_names(),
        rows,
    })
}

/// Fill defaults declared by the schema
///
/// Columns the table lacks are added when the schema declares a default for
/// them, and nulls in such columns are replaced by the default.
pub fn assign_defaults(schema: &TableSchema, mut table: DatasetTable) -> DatasetTable {
    for column in &schema.columns {
        let Some(default) = &column.default else {
            continue;
        };
        let idx = match table.column_index(&column.name) {
            Some(idx) => idx,
            None => {
                table.columns.push(column.name.clone());
                for row in &mut table.rows {
                    row.values.push(Value::Null);
                }
                table.columns.len() - 1
            },
        };
        for row in &mut table.rows {
            if let Some(cell) = row.values.get_mut(idx) {
                if cell.is_null() {
                    *cell = default.clone();
                }
            }
        }
    }
    table
}
