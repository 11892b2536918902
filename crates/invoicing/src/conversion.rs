//! Multi-currency derivation with USD as the pivot.
//!
//! Rates are always expressed relative to USD: `usd_eur` is EUR per USD and
//! `usd_aoa` is AOA per USD. A conversion between two non-USD currencies goes
//! through USD, and `eur_aoa` is derived from the other two instead of being
//! fetched independently.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bizsuite_core::{DomainError, DomainResult, ValueObject};

use crate::currency::Currency;
use crate::money::round_storage;
use crate::totals::InvoiceTotals;

/// Largest per-amount drift tolerated when re-deriving stored conversions.
///
/// Each stored amount is rounded independently to 6 decimals, so totals derived
/// from rounded components may differ from a direct conversion by a few units
/// in the last place.
pub const CONSISTENCY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateSet {
    usd_eur: Decimal,
    usd_aoa: Decimal,
    eur_aoa: Decimal,
}

impl ValueObject for ExchangeRateSet {}

impl ExchangeRateSet {
    /// Build a rate set from the two USD-anchored rates, deriving `eur_aoa`.
    pub fn new(usd_eur: Decimal, usd_aoa: Decimal) -> DomainResult<Self> {
        ensure_positive("USD->EUR", usd_eur)?;
        ensure_positive("USD->AOA", usd_aoa)?;
        let eur_aoa = usd_aoa
            .checked_div(usd_eur)
            .map(round_storage)
            .ok_or_else(|| DomainError::exchange_rate("EUR->AOA cannot be derived"))?;
        Ok(Self {
            usd_eur,
            usd_aoa,
            eur_aoa,
        })
    }

    /// Rebuild a set from the three rates stored on an invoice.
    ///
    /// The stored cross rate is kept as-is for reporting; conversions never use it.
    pub fn from_stored(usd_eur: Decimal, usd_aoa: Decimal, eur_aoa: Decimal) -> DomainResult<Self> {
        ensure_positive("USD->EUR", usd_eur)?;
        ensure_positive("USD->AOA", usd_aoa)?;
        ensure_positive("EUR->AOA", eur_aoa)?;
        Ok(Self {
            usd_eur,
            usd_aoa,
            eur_aoa,
        })
    }

    /// Extract the set from a USD-based conversion table (`{"EUR": 0.85, "AOA": 825, ...}`).
    pub fn from_usd_table(conversion_rates: &HashMap<String, Decimal>) -> DomainResult<Self> {
        let lookup = |code: &str| {
            conversion_rates
                .get(code)
                .copied()
                .ok_or_else(|| DomainError::exchange_rate(format!("rate table has no {code} entry")))
        };
        Self::new(lookup("EUR")?, lookup("AOA")?)
    }

    pub fn usd_eur(&self) -> Decimal {
        self.usd_eur
    }

    pub fn usd_aoa(&self) -> Decimal {
        self.usd_aoa
    }

    pub fn eur_aoa(&self) -> Decimal {
        self.eur_aoa
    }

    /// Units of `currency` per USD.
    fn per_usd(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Usd => Decimal::ONE,
            Currency::Eur => self.usd_eur,
            Currency::Aoa => self.usd_aoa,
        }
    }
}

fn ensure_positive(label: &str, rate: Decimal) -> DomainResult<()> {
    if rate <= Decimal::ZERO {
        return Err(DomainError::exchange_rate(format!(
            "{label} rate must be positive (got {rate})"
        )));
    }
    Ok(())
}

/// One amount expressed in every supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmounts {
    pub usd: Decimal,
    pub eur: Decimal,
    pub aoa: Decimal,
}

impl ValueObject for CurrencyAmounts {}

impl CurrencyAmounts {
    pub fn get(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Usd => self.usd,
            Currency::Eur => self.eur,
            Currency::Aoa => self.aoa,
        }
    }

    fn checked_add(&self, other: &CurrencyAmounts) -> Option<CurrencyAmounts> {
        Some(CurrencyAmounts {
            usd: self.usd.checked_add(other.usd)?,
            eur: self.eur.checked_add(other.eur)?,
            aoa: self.aoa.checked_add(other.aoa)?,
        })
    }
}

/// Invoice totals in all three currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedTotals {
    pub subtotal: CurrencyAmounts,
    pub tax_total: CurrencyAmounts,
    pub total: CurrencyAmounts,
}

impl ValueObject for ConvertedTotals {}

/// Amounts too large to express in another currency are a problem with the
/// submitted figures, not with the rate provider.
fn overflow() -> DomainError {
    DomainError::validation("total", "amount is too large to convert")
}

/// Convert `amount` from `source` into USD (unrounded).
pub fn to_usd(amount: Decimal, source: Currency, rates: &ExchangeRateSet) -> DomainResult<Decimal> {
    match source {
        Currency::Usd => Ok(amount),
        Currency::Eur => Decimal::ONE
            .checked_div(rates.usd_eur)
            .and_then(|inverse| amount.checked_mul(inverse))
            .ok_or_else(overflow),
        Currency::Aoa => amount.checked_div(rates.usd_aoa).ok_or_else(overflow),
    }
}

/// Convert a USD amount into `target` (unrounded).
pub fn from_usd(amount_usd: Decimal, target: Currency, rates: &ExchangeRateSet) -> DomainResult<Decimal> {
    amount_usd
        .checked_mul(rates.per_usd(target))
        .ok_or_else(overflow)
}

/// Express one native amount in USD, EUR and AOA, each rounded to 6 decimals.
///
/// EUR and AOA are derived from the rounded USD amount, so the stored fields
/// satisfy `eur == usd * usd_eur` up to a single rounding step.
pub fn convert_amount(
    amount: Decimal,
    source: Currency,
    rates: &ExchangeRateSet,
) -> DomainResult<CurrencyAmounts> {
    let usd = round_storage(to_usd(amount, source, rates)?);
    Ok(CurrencyAmounts {
        usd,
        eur: round_storage(from_usd(usd, Currency::Eur, rates)?),
        aoa: round_storage(from_usd(usd, Currency::Aoa, rates)?),
    })
}

/// Derive the nine currency fields of an invoice from its native totals.
///
/// Subtotal and tax are converted independently; each currency's total is the
/// sum of its rounded subtotal and tax, so `total = subtotal + tax_total` holds
/// exactly in every currency.
pub fn convert(
    source: Currency,
    totals: &InvoiceTotals,
    rates: &ExchangeRateSet,
) -> DomainResult<ConvertedTotals> {
    let subtotal = convert_amount(totals.subtotal, source, rates)?;
    let tax_total = convert_amount(totals.tax_total, source, rates)?;
    let total = subtotal.checked_add(&tax_total).ok_or_else(overflow)?;
    Ok(ConvertedTotals {
        subtotal,
        tax_total,
        total,
    })
}

impl ConvertedTotals {
    /// Re-derive every currency field from the native totals and the given
    /// rates and check they agree within [`CONSISTENCY_TOLERANCE`].
    pub fn verify(
        &self,
        source: Currency,
        native: &InvoiceTotals,
        rates: &ExchangeRateSet,
    ) -> DomainResult<()> {
        if native.subtotal.checked_add(native.tax_total) != Some(native.total) {
            return Err(DomainError::validation("total", "total must equal subtotal + tax_total"));
        }

        let expected = convert(source, native, rates)?;
        let pairs = [
            ("subtotal", &self.subtotal, &expected.subtotal),
            ("tax_total", &self.tax_total, &expected.tax_total),
            ("total", &self.total, &expected.total),
        ];
        for (name, stored, derived) in pairs {
            for currency in Currency::ALL {
                let drift = stored.get(currency).checked_sub(derived.get(currency)).map(|d| d.abs());
                if drift.is_none_or(|d| d > CONSISTENCY_TOLERANCE) {
                    return Err(DomainError::validation(
                        field_name(name, currency),
                        format!(
                            "stored {currency} {name} {} disagrees with the stored rates (expected {})",
                            stored.get(currency),
                            derived.get(currency)
                        ),
                    ));
                }
            }
        }

        for currency in Currency::ALL {
            let sum = self.subtotal.get(currency).checked_add(self.tax_total.get(currency));
            if sum != Some(self.total.get(currency)) {
                return Err(DomainError::validation(
                    field_name("total", currency),
                    "total must equal subtotal + tax_total",
                ));
            }
        }
        Ok(())
    }
}

fn field_name(name: &str, currency: Currency) -> String {
    format!("{name}_{}", currency.code().to_ascii_lowercase())
}
