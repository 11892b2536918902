use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use bizsuite_core::DomainResult;
use bizsuite_invoicing::ExchangeRateSet;

use super::{ExchangeRateSource, fetch_rate_set};

/// Rates plus the moment they were fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachedRates {
    pub rates: ExchangeRateSet,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRates {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

/// Process-wide holder of the last fetched rate set.
///
/// Serves the display-only ticker. Invoice creation goes through
/// [`RateCache::fresh`], which always hits the source and refreshes the cache.
#[derive(Debug)]
pub struct RateCache {
    ttl: Duration,
    slot: Mutex<Option<CachedRates>>,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last stored entry, fresh or not.
    pub fn snapshot(&self) -> Option<CachedRates> {
        self.slot.lock().ok().and_then(|slot| *slot)
    }

    /// Cached rates if they are still within the ttl.
    pub fn get(&self, now: DateTime<Utc>) -> Option<CachedRates> {
        self.snapshot().filter(|c| c.is_fresh(now, self.ttl))
    }

    pub fn store(&self, rates: ExchangeRateSet, now: DateTime<Utc>) -> CachedRates {
        let entry = CachedRates {
            rates,
            fetched_at: now,
        };
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(entry);
        }
        entry
    }

    /// Fetch from `source` unconditionally and remember the result.
    pub fn fresh<S>(&self, source: &S, now: DateTime<Utc>) -> DomainResult<ExchangeRateSet>
    where
        S: ExchangeRateSource + ?Sized,
    {
        let rates = fetch_rate_set(source)?;
        self.store(rates, now);
        Ok(rates)
    }

    /// Serve from the cache while fresh, otherwise refetch.
    ///
    /// When the refetch fails and an older entry exists, the stale entry is
    /// returned; its `fetched_at` tells the caller how old it is.
    pub fn get_or_fetch<S>(&self, source: &S, now: DateTime<Utc>) -> DomainResult<CachedRates>
    where
        S: ExchangeRateSource + ?Sized,
    {
        if let Some(hit) = self.get(now) {
            debug!(fetched_at = %hit.fetched_at, "rate cache hit");
            return Ok(hit);
        }

        match fetch_rate_set(source) {
            Ok(rates) => Ok(self.store(rates, now)),
            Err(err) => match self.snapshot() {
                Some(stale) => {
                    warn!(error = %err, fetched_at = %stale.fetched_at, "rate refresh failed, serving stale rates");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bizsuite_core::DomainError;
    use bizsuite_invoicing::Currency;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::rates::{PlaceholderRateSource, RateSourceError, RateTable};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl ExchangeRateSource for Counting {
        fn fetch_rates(&self, base: Currency) -> Result<RateTable, RateSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RateSourceError::Transport("timeout".to_string()));
            }
            PlaceholderRateSource::default().fetch_rates(base)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
    }

    #[test]
    fn serves_from_cache_within_ttl() {
        let cache = RateCache::new(Duration::from_secs(60));
        let source = Counting::default();

        cache.get_or_fetch(&source, at(0)).unwrap();
        cache.get_or_fetch(&source, at(59)).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let refreshed = cache.get_or_fetch(&source, at(60)).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.fetched_at, at(60));
    }

    #[test]
    fn falls_back_to_stale_rates_when_refresh_fails() {
        let cache = RateCache::new(Duration::from_secs(60));
        let source = Counting::default();
        cache.get_or_fetch(&source, at(0)).unwrap();

        source.fail.store(true, Ordering::SeqCst);
        let stale = cache.get_or_fetch(&source, at(120)).unwrap();
        assert_eq!(stale.fetched_at, at(0));
        assert_eq!(stale.rates.usd_eur(), dec!(0.85));
    }

    #[test]
    fn empty_cache_surfaces_the_fetch_error() {
        let cache = RateCache::new(Duration::from_secs(60));
        let source = Counting::default();
        source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            cache.get_or_fetch(&source, at(0)),
            Err(DomainError::ExchangeRate { .. })
        ));
    }

    #[test]
    fn fresh_always_fetches_and_refreshes_the_cache() {
        let cache = RateCache::new(Duration::from_secs(3600));
        let source = Counting::default();
        cache.fresh(&source, at(0)).unwrap();
        cache.fresh(&source, at(1)).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.snapshot().unwrap().fetched_at, at(1));
    }
}
