//! Response normalization for transport-level HTTP responses
//!
//! Converts a status code and raw body into either tabular or raw structured
//! data. This layer never errors: bodies that cannot be parsed come back as
//! plain text paired with the real status code, and callers are expected to
//! check the payload variant rather than the status code alone.

use serde_json::Value;

use crate::table::Table;

/// The caller's desired output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Normalize the body into a [`Table`] when the response succeeded
    #[default]
    Table,
    /// Pass the parsed body through untouched
    Raw,
}

impl Output {
    /// Stable name used when the output mode participates in a cache key
    pub fn as_str(&self) -> &'static str {
        match self {
            Output::Table => "table",
            Output::Raw => "raw",
        }
    }
}

/// A normalized response or cache payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Tabular data (rows x named columns)
    Table(Table),
    /// Structured data without a tabular shape (error bodies, raw mode)
    Raw(Value),
    /// Unparseable body kept verbatim
    Text(String),
}

impl Payload {
    /// Borrows the table when the payload is tabular
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Payload::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Whether the payload carries no data at all
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Table(table) => table.is_empty(),
            Payload::Raw(value) => value.is_null(),
            Payload::Text(text) => text.is_empty(),
        }
    }
}

/// Normalizes one transport response into `(payload, status_code)`.
///
/// Raw mode returns the parsed body with the real status code regardless of
/// success. Table mode builds a [`Table`] for 2xx responses (dropping the
/// non-informational `s` status column) and returns the raw structured body
/// for anything else. Bodies that parse as neither come back as text.
pub fn normalize(status: u16, body: &str, output: Output) -> (Payload, u16) {
    match output {
        Output::Raw => (parse_raw(body), status),
        Output::Table => {
            if (200..300).contains(&status) {
                let table = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| Table::from_json(&v).ok());
                match table {
                    Some(mut table) => {
                        table.drop_column("s");
                        (Payload::Table(table), status)
                    }
                    None => (Payload::Text(body.to_string()), status),
                }
            } else {
                (parse_raw(body), status)
            }
        }
    }
}

fn parse_raw(body: &str) -> Payload {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Payload::Raw(value),
        Err(_) => Payload::Text(body.to_string()),
    }
}
