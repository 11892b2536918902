//! Exchange-rate sources.
//!
//! A source returns a USD-based rate table; the conversion engine only needs
//! the EUR and AOA entries of it.

pub mod cache;
#[cfg(feature = "live-rates")]
pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use bizsuite_core::{DomainError, DomainResult};
use bizsuite_invoicing::{Currency, ExchangeRateSet};

pub use cache::{CachedRates, RateCache};
#[cfg(feature = "live-rates")]
pub use http::HttpRateSource;

/// Rate table as returned by the provider: units of each currency per one `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub conversion_rates: HashMap<String, Decimal>,
}

impl RateTable {
    /// Extract the engine's rate set. Only USD-based tables are accepted.
    pub fn rate_set(&self) -> DomainResult<ExchangeRateSet> {
        if !self.base.eq_ignore_ascii_case(Currency::Usd.code()) {
            return Err(DomainError::exchange_rate(format!(
                "expected a USD-based rate table, got base {}",
                self.base
            )));
        }
        ExchangeRateSet::from_usd_table(&self.conversion_rates)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateSourceError {
    #[error("rate provider unreachable: {0}")]
    Transport(String),

    #[error("rate provider answered with an error: {0}")]
    Provider(String),

    #[error("malformed rate response: {0}")]
    Malformed(String),
}

impl From<RateSourceError> for DomainError {
    fn from(value: RateSourceError) -> Self {
        DomainError::exchange_rate(value.to_string())
    }
}

/// Something that can produce a rate table for a base currency.
pub trait ExchangeRateSource: Send + Sync {
    fn fetch_rates(&self, base: Currency) -> Result<RateTable, RateSourceError>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

impl<S> ExchangeRateSource for Arc<S>
where
    S: ExchangeRateSource + ?Sized,
{
    fn fetch_rates(&self, base: Currency) -> Result<RateTable, RateSourceError> {
        (**self).fetch_rates(base)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Fixed table used until a live provider is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRateSource {
    usd_eur: Decimal,
    usd_aoa: Decimal,
}

impl PlaceholderRateSource {
    pub fn new(usd_eur: Decimal, usd_aoa: Decimal) -> Self {
        Self { usd_eur, usd_aoa }
    }
}

impl Default for PlaceholderRateSource {
    fn default() -> Self {
        Self {
            usd_eur: Decimal::new(85, 2),
            usd_aoa: Decimal::from(825),
        }
    }
}

impl ExchangeRateSource for PlaceholderRateSource {
    fn fetch_rates(&self, base: Currency) -> Result<RateTable, RateSourceError> {
        // Only the USD table is meaningful; other bases are re-expressed through it.
        let per_base = match base {
            Currency::Usd => Decimal::ONE,
            Currency::Eur => self.usd_eur,
            Currency::Aoa => self.usd_aoa,
        };
        let rebase = |rate: Decimal| {
            rate.checked_div(per_base)
                .ok_or_else(|| RateSourceError::Malformed(format!("cannot rebase onto {base}")))
        };

        let conversion_rates = HashMap::from([
            ("USD".to_string(), rebase(Decimal::ONE)?),
            ("EUR".to_string(), rebase(self.usd_eur)?),
            ("AOA".to_string(), rebase(self.usd_aoa)?),
        ]);
        Ok(RateTable {
            base: base.code().to_string(),
            conversion_rates,
        })
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Fetch the USD table from `source` and turn it into a rate set.
pub fn fetch_rate_set<S>(source: &S) -> DomainResult<ExchangeRateSet>
where
    S: ExchangeRateSource + ?Sized,
{
    let table = source.fetch_rates(Currency::Usd)?;
    let rates = table.rate_set()?;
    debug!(
        source = source.name(),
        usd_eur = %rates.usd_eur(),
        usd_aoa = %rates.usd_aoa(),
        "fetched exchange rates"
    );
    Ok(rates)
}
