//! End-to-end tests for invoice assembly.
//!
//! Payload → validation → totals → conversion → store (→ change feed).
//!
//! Verifies:
//! - The worked USD example lands in the store with all nine currency fields
//! - Failed steps leave no rows behind, or report the orphan when they must
//! - Tenants only ever see their own invoices

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use bizsuite_core::{ClientId, DomainError, InvoiceId, UserId};
    use bizsuite_events::{ChangeEvent, ChangeFilter, ChangeKind, InMemoryEventBus};
    use bizsuite_invoicing::{Currency, InvoiceStatus, LineItemInput, NewInvoice};

    use crate::assembly::{AssemblyState, InvoiceAssembler, MAX_NUMBER_ATTEMPTS};
    use crate::rates::{PlaceholderRateSource, RateCache, RateSourceError, RateTable};
    use crate::render::PlainTextRenderer;
    use crate::store::{Filter, InMemoryStore, PublishingStore, RelationalStore, Row, StoreError};
    use crate::watcher::ChangeWatcher;
    use crate::{DocumentRenderer, ExchangeRateSource};

    /// Store that can be told to fail specific writes.
    #[derive(Default)]
    struct FaultyStore {
        inner: InMemoryStore,
        fail_insert_into: Option<&'static str>,
        fail_delete_from: Option<&'static str>,
        always_collide: bool,
        invoice_inserts: AtomicUsize,
    }

    impl FaultyStore {
        fn failing_items() -> Self {
            Self {
                fail_insert_into: Some("invoice_items"),
                ..Self::default()
            }
        }
    }

    impl RelationalStore for FaultyStore {
        fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
            if table == "invoices" {
                self.invoice_inserts.fetch_add(1, Ordering::SeqCst);
                if self.always_collide {
                    return Err(StoreError::UniqueViolation {
                        table: "invoices".to_string(),
                        column: "invoice_number".to_string(),
                    });
                }
            }
            if self.fail_insert_into == Some(table) {
                return Err(StoreError::Backend(format!("{table} is read-only")));
            }
            self.inner.insert(table, rows)
        }

        fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            self.inner.select(table, filter)
        }

        fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            self.inner.update(table, patch, filter)
        }

        fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
            if self.fail_delete_from == Some(table) {
                return Err(StoreError::Backend("connection lost".to_string()));
            }
            self.inner.delete(table, filter)
        }
    }

    struct DownRates;

    impl ExchangeRateSource for DownRates {
        fn fetch_rates(&self, _base: Currency) -> Result<RateTable, RateSourceError> {
            Err(RateSourceError::Transport("dns failure".to_string()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    fn taxed_item() -> LineItemInput {
        LineItemInput {
            description: "Consulting".to_string(),
            quantity: dec!(2),
            unit_price: dec!(100),
            tax_rate: dec!(14),
            tax_exemption_reason: None,
        }
    }

    fn payload(currency: &str, items: Vec<LineItemInput>) -> NewInvoice {
        NewInvoice {
            client_id: Some(ClientId::new().to_string()),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            currency: currency.to_string(),
            language: "en".to_string(),
            status: None,
            notes: Some("Thank you for your business".to_string()),
            items,
        }
    }

    fn assembler<S: RelationalStore>(store: S) -> InvoiceAssembler<S, PlaceholderRateSource> {
        InvoiceAssembler::new(store, PlaceholderRateSource::default()).with_rng_seed(7)
    }

    #[test]
    fn usd_example_is_persisted_in_every_currency() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let created = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap();

        let inv = &created.invoice.fields;
        assert_eq!((inv.subtotal, inv.tax_total, inv.total), (dec!(200), dec!(28), dec!(228)));
        assert_eq!(inv.total_usd, dec!(228));
        assert_eq!(inv.total_eur, dec!(193.8));
        assert_eq!(inv.total_aoa, dec!(188100));
        assert_eq!(inv.exchange_rate_eur_to_aoa, dec!(970.588235));
        assert_eq!(inv.status, InvoiceStatus::Draft);
        assert!(inv.invoice_number.as_str().starts_with("INV-2601-"));
        assert!(inv.verify_consistency().is_ok());

        assert_eq!(created.items.len(), 1);
        let line = &created.items[0].fields;
        assert_eq!(line.invoice_id, created.invoice.id);
        assert_eq!(line.total_with_tax_eur, dec!(193.8));
        assert_eq!(line.position, 1);

        assert_eq!(
            created.trace,
            vec![
                AssemblyState::Validating,
                AssemblyState::ResolvingCompany,
                AssemblyState::ComputingTotals,
                AssemblyState::ConvertingCurrencies,
                AssemblyState::Persisting,
                AssemblyState::Done,
            ]
        );
        assert_eq!(store.row_count("invoices"), 1);
        assert_eq!(store.row_count("invoice_items"), 1);
    }

    #[test]
    fn eur_invoice_pivots_through_usd() {
        let mut exempt = taxed_item();
        exempt.quantity = dec!(1);
        exempt.tax_rate = dec!(0);
        exempt.tax_exemption_reason = Some("Exempt under article 12".to_string());

        let created = assembler(InMemoryStore::with_invoice_schema())
            .create_invoice(UserId::new(), &payload("eur", vec![exempt]))
            .unwrap();

        let inv = &created.invoice.fields;
        assert_eq!(inv.currency, Currency::Eur);
        assert_eq!(inv.total_usd, dec!(117.647059));
        assert_eq!(inv.total_eur, dec!(100));
        assert_eq!(inv.tax_total_aoa, dec!(0));
        assert_eq!(
            created.items[0].fields.tax_exemption_reason.as_deref(),
            Some("Exempt under article 12")
        );
    }

    #[test]
    fn unsupported_currency_writes_nothing() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let err = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("GBP", vec![taxed_item()]))
            .unwrap_err();

        assert_eq!(err.error, DomainError::unsupported_currency("GBP"));
        assert_eq!(err.state, AssemblyState::Validating);
        assert_eq!(store.row_count("companies"), 0);
        assert_eq!(store.row_count("invoices"), 0);
    }

    #[test]
    fn empty_items_are_rejected_before_any_write() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let err = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("USD", vec![]))
            .unwrap_err();

        assert_eq!(err.error, DomainError::validation("items", "items required"));
        assert_eq!(store.row_count("companies"), 0);
        assert_eq!(store.row_count("invoices"), 0);
        assert_eq!(store.row_count("invoice_items"), 0);
    }

    #[test]
    fn zero_tax_needs_a_justification() {
        let mut item = taxed_item();
        item.tax_rate = dec!(0);
        let err = assembler(InMemoryStore::new())
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item(), item]))
            .unwrap_err();
        assert_eq!(err.error.field(), Some("items[2].tax_exemption_reason"));
    }

    #[test]
    fn item_failure_removes_the_header() {
        let store = Arc::new(FaultyStore::failing_items());
        let err = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap_err();

        assert!(matches!(err.error, DomainError::Persistence { .. }));
        assert_eq!(err.state, AssemblyState::Persisting);
        assert_eq!(store.inner.row_count("invoices"), 0);
    }

    #[test]
    fn failed_compensation_reports_the_orphan() {
        let store = Arc::new(FaultyStore {
            fail_delete_from: Some("invoices"),
            ..FaultyStore::failing_items()
        });
        let err = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap_err();

        let orphan = store.inner.select("invoices", &Filter::new()).unwrap();
        assert_eq!(orphan.len(), 1);
        let orphan_id = orphan[0]["id"].as_str().unwrap().to_string();
        assert_eq!(err.error, DomainError::partial_write(orphan_id));
    }

    #[test]
    fn number_collision_is_retried_with_a_new_number() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let user = UserId::new();

        // Same seed, same issue month: the second assembler's first pick collides.
        let first = assembler(store.clone())
            .create_invoice(user, &payload("USD", vec![taxed_item()]))
            .unwrap();
        let second = assembler(store.clone())
            .create_invoice(user, &payload("USD", vec![taxed_item()]))
            .unwrap();

        assert_ne!(
            first.invoice.fields.invoice_number,
            second.invoice.fields.invoice_number
        );
        assert_eq!(store.row_count("invoices"), 2);
    }

    #[test]
    fn persistent_collisions_give_up_after_the_retry_budget() {
        let store = Arc::new(FaultyStore {
            always_collide: true,
            ..FaultyStore::default()
        });
        let err = assembler(store.clone())
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap_err();

        assert_eq!(
            err.error,
            DomainError::persistence("an invoice with this number already exists")
        );
        assert_eq!(store.invoice_inserts.load(Ordering::SeqCst), MAX_NUMBER_ATTEMPTS);
    }

    #[test]
    fn rate_outage_fails_before_persisting() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let err = InvoiceAssembler::new(store.clone(), DownRates)
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap_err();

        assert!(matches!(err.error, DomainError::ExchangeRate { .. }));
        assert_eq!(err.state, AssemblyState::ConvertingCurrencies);
        assert_eq!(store.row_count("invoices"), 0);
    }

    #[test]
    fn company_is_provisioned_once_per_tenant() {
        let store = Arc::new(InMemoryStore::with_invoice_schema());
        let engine = assembler(store.clone());
        let user = UserId::new();

        let a = engine.create_invoice(user, &payload("USD", vec![taxed_item()])).unwrap();
        let b = engine.create_invoice(user, &payload("AOA", vec![taxed_item()])).unwrap();

        assert_eq!(a.company.id, b.company.id);
        assert_eq!(a.company.fields.name, "My Company");
        assert_eq!(store.row_count("companies"), 1);
    }

    #[test]
    fn tenants_are_isolated() {
        let engine = assembler(InMemoryStore::with_invoice_schema());
        let owner = UserId::new();
        let stranger = UserId::new();
        let created = engine.create_invoice(owner, &payload("USD", vec![taxed_item()])).unwrap();

        assert_eq!(
            engine.get_invoice(stranger, created.invoice.id).unwrap_err(),
            DomainError::NotFound
        );
        assert!(engine.list_invoices(stranger).unwrap().is_empty());
        assert_eq!(engine.list_invoices(owner).unwrap().len(), 1);

        let (invoice, items) = engine.get_invoice(owner, created.invoice.id).unwrap();
        assert_eq!(invoice, created.invoice);
        assert_eq!(items, created.items);
    }

    #[test]
    fn status_moves_follow_the_lifecycle() {
        let engine = assembler(InMemoryStore::with_invoice_schema());
        let user = UserId::new();
        let id = engine
            .create_invoice(user, &payload("USD", vec![taxed_item()]))
            .unwrap()
            .invoice
            .id;

        let sent = engine.transition_status(user, id, InvoiceStatus::Sent).unwrap();
        assert_eq!(sent.fields.status, InvoiceStatus::Sent);

        assert!(matches!(
            engine.transition_status(user, id, InvoiceStatus::Draft),
            Err(DomainError::Conflict(_))
        ));
        engine.transition_status(user, id, InvoiceStatus::Paid).unwrap();
        assert!(engine.transition_status(user, id, InvoiceStatus::Voided).is_err());

        assert_eq!(
            engine.transition_status(user, InvoiceId::new(), InvoiceStatus::Sent),
            Err(DomainError::NotFound)
        );
    }

    #[test]
    fn renders_a_plain_text_document() {
        let engine = assembler(InMemoryStore::with_invoice_schema());
        let user = UserId::new();
        let created = engine.create_invoice(user, &payload("USD", vec![taxed_item()])).unwrap();

        let renderer = PlainTextRenderer;
        let bytes = engine.render_document(user, created.invoice.id, &renderer).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(renderer.content_type().starts_with("text/plain"));
        assert!(text.starts_with(&format!("INVOICE {}", created.invoice.fields.invoice_number)));
        assert!(text.contains("My Company"));
        assert!(text.contains("Total: $228.00"));
        assert!(text.contains("€193.80"));
        assert!(text.contains("AOA 188,100.00"));
        assert!(text.contains("Thank you for your business"));
    }

    #[test]
    fn creation_refreshes_the_shared_rate_cache() {
        let cache = Arc::new(RateCache::new(Duration::from_secs(3600)));
        let engine = assembler(InMemoryStore::with_invoice_schema()).with_rate_cache(cache.clone());
        assert!(cache.snapshot().is_none());

        engine
            .create_invoice(UserId::new(), &payload("USD", vec![taxed_item()]))
            .unwrap();
        assert_eq!(cache.snapshot().unwrap().rates.usd_aoa(), dec!(825));
    }

    #[test]
    fn watchers_see_new_invoices_for_their_tenant() {
        let bus = Arc::new(InMemoryEventBus::<ChangeEvent>::new());
        let store = PublishingStore::new(InMemoryStore::with_invoice_schema(), bus.clone());
        let engine = assembler(store);
        let user = UserId::new();

        let (tx, rx) = mpsc::channel();
        let handle = ChangeWatcher::on_change(
            "invoice-list",
            &bus,
            ChangeFilter::table("invoices").for_tenant(user),
            move |change: ChangeEvent| tx.send(change).map_err(|e| e.to_string()),
        )
        .unwrap();

        let created = engine.create_invoice(user, &payload("USD", vec![taxed_item()])).unwrap();
        let change = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.row_id, Some(created.invoice.id.into()));

        engine.transition_status(user, created.invoice.id, InvoiceStatus::Sent).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().kind, ChangeKind::Update);

        handle.shutdown();
    }
}
