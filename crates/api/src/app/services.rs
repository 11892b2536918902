use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bizsuite_events::{ChangeEvent, ChangeFilter, InMemoryEventBus};
use bizsuite_infra::config::ConfigError;
use bizsuite_infra::{
    ChangeWatcher, DocumentRenderer, EngineConfig, ExchangeRateSource, InMemoryStore,
    InvoiceAssembler, PlainTextRenderer, PublishingStore, RateCache, RelationalStore,
    WatcherHandle,
};

pub type SharedStore = Arc<dyn RelationalStore>;
pub type SharedRates = Arc<dyn ExchangeRateSource>;
pub type ChangeBus = Arc<InMemoryEventBus<ChangeEvent>>;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub assembler: InvoiceAssembler<SharedStore, SharedRates>,
    pub rate_cache: Arc<RateCache>,
    pub renderer: Arc<dyn DocumentRenderer>,
    /// Every committed row change is announced here.
    pub changes: ChangeBus,
}

impl AppServices {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let rates = config.rates.rate_source()?;
        tracing::info!(rate_source = rates.name(), ttl_secs = config.rates.ttl.as_secs(), "exchange rates configured");
        Ok(Self::new(
            Arc::new(InMemoryStore::with_invoice_schema()),
            rates,
            config.rates.ttl,
        ))
    }

    /// Wire services over `store`; writes go through a publishing adapter.
    pub fn new(store: SharedStore, rates: SharedRates, rates_ttl: Duration) -> Self {
        let changes: ChangeBus = Arc::new(InMemoryEventBus::new());
        let store: SharedStore = Arc::new(PublishingStore::new(store, changes.clone()));
        let rate_cache = Arc::new(RateCache::new(rates_ttl));
        Self {
            assembler: InvoiceAssembler::new(store, rates).with_rate_cache(rate_cache.clone()),
            rate_cache,
            renderer: Arc::new(PlainTextRenderer),
            changes,
        }
    }

    /// Log every committed invoice change until the handle is shut down.
    pub fn watch_invoice_activity(&self) -> io::Result<WatcherHandle> {
        ChangeWatcher::on_change(
            "invoice-activity",
            &self.changes,
            ChangeFilter::table("invoices"),
            |change: ChangeEvent| {
                tracing::info!(
                    tenant_id = %change.tenant_id,
                    kind = ?change.kind,
                    invoice_id = ?change.row_id,
                    "invoice changed"
                );
                Ok::<(), Infallible>(())
            },
        )
    }
}
