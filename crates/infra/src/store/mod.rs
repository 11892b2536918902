//! Relational store boundary.
//!
//! The engine talks to a hosted row store through [`RelationalStore`]. Rows
//! travel as JSON objects; [`records`] maps them to typed records.

pub mod in_memory;
pub mod records;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use records::{
    CompanyRecord, InvoiceItemRecord, InvoiceRecord, NewCompany, NewInvoiceItemRow, NewInvoiceRow,
    Record,
};
pub use r#trait::{Filter, RelationalStore, Row, SortOrder, StoreError};

use tracing::warn;
use uuid::Uuid;

use bizsuite_core::UserId;
use bizsuite_events::{ChangeEvent, ChangeKind, EventBus};

/// Adapter that publishes a [`ChangeEvent`] for each row after a successful write.
///
/// Publish happens only after the wrapped store accepted the write. Rows without a
/// parseable `user_id` have no tenant and are not announced.
pub struct PublishingStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> PublishingStore<S, B>
where
    B: EventBus<ChangeEvent>,
{
    fn announce(&self, table: &str, kind: ChangeKind, rows: &[Row]) {
        for row in rows {
            let Some(tenant_id) = row
                .get("user_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<UserId>().ok())
            else {
                continue;
            };
            let row_id = row
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok());

            // The write is already durable; a lost notification only delays a refetch.
            if let Err(err) = self.bus.publish(ChangeEvent::new(table, tenant_id, kind, row_id)) {
                warn!(table, error = ?err, "failed to publish change notification");
            }
        }
    }
}

impl<S, B> RelationalStore for PublishingStore<S, B>
where
    S: RelationalStore,
    B: EventBus<ChangeEvent>,
{
    fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let stored = self.store.insert(table, rows)?;
        self.announce(table, ChangeKind::Insert, &stored);
        Ok(stored)
    }

    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.store.select(table, filter)
    }

    fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let updated = self.store.update(table, patch, filter)?;
        self.announce(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let removed = self.store.delete(table, filter)?;
        self.announce(table, ChangeKind::Delete, &removed);
        Ok(removed)
    }
}
