use bizsuite_core::TenantId;

/// Tenant context for a request.
///
/// Derived from the bearer token's subject; every invoice route requires it
/// and passes the tenant explicitly to the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
