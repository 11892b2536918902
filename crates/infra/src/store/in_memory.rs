use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::r#trait::{Filter, RelationalStore, Row, StoreError};

/// In-memory table store.
///
/// Intended for tests/dev. Mirrors the hosted backend's defaults: rows get a
/// UUIDv7 `id` and a fixed-width RFC 3339 `created_at` when the caller does
/// not provide them, and configured unique columns are enforced per table.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique: Vec<(String, String)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the constraints the invoice schema declares.
    /// Constraints of the hosted schema: unique invoice numbers and one
    /// auto-provisioned company per tenant.
    pub fn with_invoice_schema() -> Self {
        Self::new()
            .with_unique("invoices", "invoice_number")
            .with_unique("companies", "user_id")
    }

    pub fn with_unique(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.unique.push((table.into(), column.into()));
        self
    }

    /// Number of rows currently in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn check_unique(&self, table: &str, existing: &[Row], incoming: &[Row]) -> Result<(), StoreError> {
        for (t, column) in self.unique.iter().filter(|(t, _)| t == table) {
            let mut seen: HashSet<String> = existing
                .iter()
                .filter_map(|r| r.get(column))
                .filter(|v| !v.is_null())
                .map(JsonValue::to_string)
                .collect();
            for row in incoming {
                let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                    continue;
                };
                if !seen.insert(value.to_string()) {
                    return Err(StoreError::UniqueViolation {
                        table: t.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl RelationalStore for InMemoryStore {
    fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                row.entry("id")
                    .or_insert_with(|| JsonValue::String(Uuid::now_v7().to_string()));
                row.entry("created_at")
                    .or_insert_with(|| JsonValue::String(now.clone()));
                row
            })
            .collect();

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let existing = tables.entry(table.to_string()).or_default();
        self.check_unique(table, existing, &rows)?;

        existing.extend(rows.iter().cloned());
        Ok(rows)
    }

    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let matching = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        Ok(filter.arrange(matching))
    }

    fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut candidate = rows.clone();
        let mut updated = Vec::new();
        for row in candidate.iter_mut().filter(|r| filter.matches(r)) {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }

        let untouched: Vec<Row> = candidate
            .iter()
            .filter(|r| !updated.contains(r))
            .cloned()
            .collect();
        self.check_unique(table, &untouched, &updated)?;

        *rows = candidate;
        Ok(updated)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows.drain(..).partition(|r| filter.matches(r));
        *rows = kept;
        Ok(removed)
    }
}
