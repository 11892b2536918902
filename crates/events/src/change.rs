//! Row change notifications emitted by the relational store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bizsuite_core::TenantId;

use crate::tenant::TenantScoped;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub tenant_id: TenantId,
    pub kind: ChangeKind,
    /// The row's `id` column, when it has one.
    pub row_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        table: impl Into<String>,
        tenant_id: TenantId,
        kind: ChangeKind,
        row_id: Option<Uuid>,
    ) -> Self {
        Self {
            table: table.into(),
            tenant_id,
            kind,
            row_id,
            occurred_at: Utc::now(),
        }
    }
}

impl TenantScoped for ChangeEvent {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Which changes a subscriber cares about: one table, optionally one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub tenant_id: Option<TenantId>,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tenant_id: None,
        }
    }

    pub fn for_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && self.tenant_id.is_none_or(|t| t == event.tenant_id())
    }
}
