use bizsuite_core::TenantId;

/// Messages that belong to exactly one tenant.
///
/// Workers pinned to a tenant use this to drop messages from other tenants
/// before they reach a handler.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}
