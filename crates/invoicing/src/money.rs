//! Fixed-precision money helpers shared by every calculation step.
//!
//! Amounts are `rust_decimal::Decimal`, so NaN and infinities cannot be
//! represented at all. Rounding is half away from zero: 0.0000005 becomes
//! 0.000001 and -0.0000005 becomes -0.000001.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::currency::Currency;

/// Fractional digits kept for stored amounts and exchange computations.
pub const STORAGE_DECIMALS: u32 = 6;

/// Fractional digits shown to users.
pub const DISPLAY_DECIMALS: u32 = 2;

/// Round `amount` to `decimals` fractional digits, half away from zero.
pub fn round(amount: Decimal, decimals: u32) -> Decimal {
    amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_storage(amount: Decimal) -> Decimal {
    round(amount, STORAGE_DECIMALS)
}

pub fn round_display(amount: Decimal) -> Decimal {
    round(amount, DISPLAY_DECIMALS)
}

/// Render an amount the way invoices show it: `$1,234.56`, `€0.50`, `AOA 188,100.00`.
pub fn format(amount: Decimal, currency: Currency) -> String {
    let rounded = round_display(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}{}{}.{}",
        if negative { "-" } else { "" },
        currency.display_prefix(),
        grouped,
        fraction
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round(dec!(2.5), 0), dec!(3));
        assert_eq!(round(dec!(-2.5), 0), dec!(-3));
        assert_eq!(round_storage(dec!(0.0000005)), dec!(0.000001));
        assert_eq!(round_display(dec!(1.005)), dec!(1.01));
    }

    #[test]
    fn rounding_is_idempotent() {
        let once = round_storage(dec!(1.23456789));
        assert_eq!(round_storage(once), once);
    }

    #[test]
    fn formats_with_thousands_separators() {
        assert_eq!(format(dec!(1234.5), Currency::Usd), "$1,234.50");
        assert_eq!(format(dec!(188100), Currency::Aoa), "AOA 188,100.00");
        assert_eq!(format(dec!(193.8), Currency::Eur), "€193.80");
        assert_eq!(format(dec!(1234567.891), Currency::Usd), "$1,234,567.89");
    }

    #[test]
    fn formats_small_and_negative_amounts() {
        assert_eq!(format(dec!(0), Currency::Usd), "$0.00");
        assert_eq!(format(dec!(-0.001), Currency::Usd), "$0.00");
        assert_eq!(format(dec!(-1000), Currency::Eur), "-€1,000.00");
        assert_eq!(format(dec!(999.999), Currency::Usd), "$1,000.00");
    }
}
