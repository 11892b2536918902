use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use bizsuite_core::DomainError;

/// One row as the hosted store returns it: a JSON object keyed by column.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate value for {table}.{column}")]
    UniqueViolation { table: String, column: String },

    #[error("row is not an object: {0}")]
    InvalidRow(String),

    #[error("could not decode {table} row: {reason}")]
    Decode { table: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn decode(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Message suitable for showing to the person who submitted the form.
    pub fn human_message(&self) -> String {
        match self {
            StoreError::UniqueViolation { table, column } if table == "invoices" && column == "invoice_number" => {
                "an invoice with this number already exists".to_string()
            }
            StoreError::UniqueViolation { table, column } => {
                format!("a {table} row with this {} already exists", column.replace('_', " "))
            }
            StoreError::InvalidRow(_) | StoreError::Decode { .. } => {
                "the stored data has an unexpected shape".to_string()
            }
            StoreError::Backend(msg) => msg.clone(),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        DomainError::persistence(value.human_message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Equality filter with optional ordering and limit, the subset of the hosted
/// store's query language the engine relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, JsonValue)>,
    order_by: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }

    /// Apply ordering and limit to rows that already passed [`Filter::matches`].
    ///
    /// Sorting is stable, so rows with equal keys keep insertion order.
    pub fn arrange(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if let Some((column, order)) = &self.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_json(a.get(column), b.get(column));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => Ordering::Equal,
        (None | Some(JsonValue::Null), _) => Ordering::Greater,
        (_, None | Some(JsonValue::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Row-oriented relational store (the hosted backend's table API).
///
/// Each call is consistent on its own; nothing spans calls, so a multi-step
/// write must compensate explicitly when a later step fails.
pub trait RelationalStore: Send + Sync {
    /// Insert rows and return them as stored (with generated columns filled in).
    ///
    /// A batch is all-or-nothing.
    fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError>;

    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Merge `patch` into every matching row; returns the updated rows.
    fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Remove every matching row; returns the removed rows.
    fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError>;
}

impl<S> RelationalStore for Arc<S>
where
    S: RelationalStore + ?Sized,
{
    fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        (**self).insert(table, rows)
    }

    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        (**self).select(table, filter)
    }

    fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        (**self).update(table, patch, filter)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        (**self).delete(table, filter)
    }
}
