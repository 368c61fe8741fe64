//! Columnar table type for normalized API responses
//!
//! The market-data service returns column-oriented JSON: each field of the
//! response object is an array holding one value per row (scalar fields are
//! broadcast across all rows). `Table` mirrors that shape as typed columns
//! and doubles as the on-disk tabular cache format via serde.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when building a table from a JSON body
#[derive(Debug, Error)]
pub enum TableError {
    /// Column arrays disagree on the number of rows
    #[error("column '{column}' has {got} values, expected {expected}")]
    ColumnLength {
        column: String,
        got: usize,
        expected: usize,
    },

    /// The object holds only scalar fields, so no row count can be fixed
    #[error("cannot build a table from scalar values only")]
    ScalarsOnly,

    /// The body is not a JSON object of columns
    #[error("expected a JSON object of columns")]
    NotColumnar,
}

/// A single typed column; every cell is nullable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// Number of values (rows) in this column
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// Whether the column holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a column from a slice of JSON values, picking the narrowest
    /// type that fits every non-null element. Mixed or nested elements fall
    /// back to their text rendering.
    fn from_values(values: &[Value]) -> Column {
        let mut any = false;
        let mut all_bool = true;
        let mut all_int = true;
        let mut all_float = true;
        let mut all_str = true;

        for v in values.iter().filter(|v| !v.is_null()) {
            any = true;
            all_bool &= v.is_boolean();
            all_int &= v.as_i64().is_some();
            all_float &= v.is_number();
            all_str &= v.is_string();
        }

        if any && all_bool {
            Column::Bool(values.iter().map(Value::as_bool).collect())
        } else if any && all_int {
            Column::Int(values.iter().map(Value::as_i64).collect())
        } else if any && all_float {
            Column::Float(values.iter().map(Value::as_f64).collect())
        } else if !any || all_str {
            Column::Text(
                values
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )
        } else {
            // Mixed scalars or nested values: keep the row, lose the type
            Column::Text(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )
        }
    }
}

/// Rectangular, typed, column-major data: rows x named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    /// Creates an empty table (zero rows, zero columns)
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Looks up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Iterates over column names in table order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Adds a column, replacing any existing column of the same name
    ///
    /// # Returns
    /// * `Ok(())` if the column length matches the table's row count
    /// * `Err(TableError::ColumnLength)` otherwise
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), TableError> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.rows() {
            return Err(TableError::ColumnLength {
                column: name,
                got: column.len(),
                expected: self.rows(),
            });
        }
        self.columns.retain(|(n, _)| *n != name);
        self.columns.push((name, column));
        Ok(())
    }

    /// Removes a column if present; returns whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|(n, _)| n != name);
        self.columns.len() != before
    }

    /// Builds a table from a column-oriented JSON object
    ///
    /// Array-valued fields become columns and must agree on length; scalar
    /// fields are broadcast across every row. An object with only scalar
    /// fields has no row count to anchor on and is rejected; an empty object
    /// yields an empty table.
    pub fn from_json(value: &Value) -> Result<Table, TableError> {
        let map = value.as_object().ok_or(TableError::NotColumnar)?;

        let mut rows: Option<usize> = None;
        for (name, field) in map {
            if let Value::Array(items) = field {
                match rows {
                    None => rows = Some(items.len()),
                    Some(expected) if expected != items.len() => {
                        return Err(TableError::ColumnLength {
                            column: name.clone(),
                            got: items.len(),
                            expected,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        let rows = match rows {
            Some(n) => n,
            None if map.is_empty() => 0,
            None => return Err(TableError::ScalarsOnly),
        };

        let mut table = Table::new();
        for (name, field) in map {
            let column = match field {
                Value::Array(items) => Column::from_values(items),
                scalar => Column::from_values(&vec![scalar.clone(); rows]),
            };
            table.columns.push((name.clone(), column));
        }
        Ok(table)
    }
}
