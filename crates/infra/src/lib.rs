//! Infrastructure layer: store boundary, exchange rates, invoice assembly,
//! document rendering, change watchers and configuration.

pub mod assembly;
pub mod company;
pub mod config;
pub mod rates;
pub mod render;
pub mod store;
pub mod watcher;

pub use assembly::{AssemblyError, AssemblyState, CreatedInvoice, InvoiceAssembler};
pub use config::{ConfigError, EngineConfig, RateSourceKind, RatesConfig};
pub use rates::{ExchangeRateSource, PlaceholderRateSource, RateCache, RateTable};
pub use render::{DocumentRenderer, PlainTextRenderer, RenderError, RenderableInvoice};
pub use store::{InMemoryStore, PublishingStore, RelationalStore};
pub use watcher::{ChangeWatcher, WatcherHandle};

#[cfg(test)]
mod integration_tests;
