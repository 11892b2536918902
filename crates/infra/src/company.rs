use tracing::{debug, info};

use bizsuite_core::{DomainError, DomainResult, UserId};

use crate::store::records::{self, CompanyRecord, NewCompany, Record};
use crate::store::{Filter, RelationalStore, SortOrder, StoreError};

/// The tenant's issuing company: the earliest one created, or a placeholder
/// company created on the spot when the tenant has none yet.
///
/// Two first invoices racing for the same tenant both land on one company: the
/// schema allows a single company per `user_id`, and the loser of the insert
/// reads back the winner's row.
pub fn resolve_company<S>(store: &S, user_id: UserId) -> DomainResult<CompanyRecord>
where
    S: RelationalStore + ?Sized,
{
    if let Some(company) = earliest_company(store, user_id)? {
        return Ok(company);
    }

    let row = records::encode(&NewCompany::defaults(user_id))?;
    let stored = match store.insert(CompanyRecord::TABLE, vec![row]) {
        Ok(stored) => stored,
        Err(StoreError::UniqueViolation { .. }) => {
            debug!(tenant_id = %user_id, "default company created concurrently, reusing it");
            return earliest_company(store, user_id)?
                .ok_or_else(|| DomainError::persistence("company vanished after a duplicate insert"));
        }
        Err(e) => return Err(e.into()),
    };
    let company: CompanyRecord = stored
        .into_iter()
        .next()
        .map(records::decode)
        .transpose()?
        .ok_or_else(|| DomainError::persistence("company insert returned no row"))?;

    info!(tenant_id = %user_id, company_id = %company.id, "provisioned default company");
    Ok(company)
}

fn earliest_company<S>(store: &S, user_id: UserId) -> DomainResult<Option<CompanyRecord>>
where
    S: RelationalStore + ?Sized,
{
    let filter = Filter::new()
        .eq("user_id", user_id.to_string())
        .order_by("created_at", SortOrder::Asc)
        .limit(1);
    let existing = store.select(CompanyRecord::TABLE, &filter)?;
    Ok(existing.into_iter().next().map(records::decode).transpose()?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::store::{InMemoryStore, Row};
    use serde_json::json;

    #[test]
    fn creates_defaults_once_then_reuses_them() {
        let store = InMemoryStore::new();
        let user = UserId::new();

        let first = resolve_company(&store, user).unwrap();
        let second = resolve_company(&store, user).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.fields.email, "company@example.com");
        assert_eq!(store.row_count("companies"), 1);
    }

    #[test]
    fn picks_the_earliest_company() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let mut later = records::encode(&NewCompany::defaults(user)).unwrap();
        later.insert("name".to_string(), json!("Later Ltd"));
        later.insert("created_at".to_string(), json!("2026-03-01T00:00:00.000000Z"));
        let mut earlier = records::encode(&NewCompany::defaults(user)).unwrap();
        earlier.insert("name".to_string(), json!("Earlier Lda"));
        earlier.insert("created_at".to_string(), json!("2026-01-01T00:00:00.000000Z"));
        store.insert("companies", vec![later, earlier]).unwrap();

        let company = resolve_company(&store, user).unwrap();
        assert_eq!(company.fields.name, "Earlier Lda");
    }

    /// Answers the first `select` as if the company did not exist yet, the
    /// way a concurrent creator sees the table just before the other commits.
    struct StaleFirstRead {
        inner: InMemoryStore,
        served_stale: AtomicBool,
    }

    impl RelationalStore for StaleFirstRead {
        fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
            self.inner.insert(table, rows)
        }

        fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            if !self.served_stale.swap(true, Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            self.inner.select(table, filter)
        }

        fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            self.inner.update(table, patch, filter)
        }

        fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            self.inner.delete(table, filter)
        }
    }

    #[test]
    fn losing_a_creation_race_reuses_the_winners_company() {
        let user = UserId::new();
        let inner = InMemoryStore::with_invoice_schema();
        let winner = resolve_company(&inner, user).unwrap();

        let store = StaleFirstRead {
            inner,
            served_stale: AtomicBool::new(false),
        };
        let loser = resolve_company(&store, user).unwrap();

        assert_eq!(loser.id, winner.id);
        assert_eq!(store.inner.row_count("companies"), 1);
    }

    #[test]
    fn concurrent_first_resolutions_provision_one_company() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let user = UserId::new();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    resolve_company(&store, user).unwrap().id
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.row_count("companies"), 1);
    }

    #[test]
    fn tenants_do_not_share_companies() {
        let store = InMemoryStore::new();
        let a = resolve_company(&store, UserId::new()).unwrap();
        let b = resolve_company(&store, UserId::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.row_count("companies"), 2);
    }
}
