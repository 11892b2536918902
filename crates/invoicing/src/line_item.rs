//! Per-line totals: subtotal, tax and total for one billable row.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bizsuite_core::{DomainError, DomainResult, ValueObject};

/// One billable row as entered on the invoice form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage, e.g. `14` for 14%.
    pub tax_rate: Decimal,
    /// Mandatory when `tax_rate` is zero.
    #[serde(default)]
    pub tax_exemption_reason: Option<String>,
}

impl LineItemInput {
    /// Check the line's own invariants.
    ///
    /// `index` is zero-based; field names in errors use the one-based position
    /// users see on the form (`items[1].quantity`).
    pub fn validate(&self, index: usize) -> DomainResult<()> {
        let position = index + 1;
        let field = |name: &str| format!("items[{position}].{name}");

        if self.description.trim().is_empty() {
            return Err(DomainError::validation(
                field("description"),
                format!("item {position}: description is required"),
            ));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                field("quantity"),
                format!("item {position}: quantity must be greater than zero"),
            ));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(
                field("unit_price"),
                format!("item {position}: unit price cannot be negative"),
            ));
        }
        if self.tax_rate < Decimal::ZERO {
            return Err(DomainError::validation(
                field("tax_rate"),
                format!("item {position}: tax rate cannot be negative"),
            ));
        }
        if self.tax_rate.is_zero() && self.exemption_reason().is_none() {
            return Err(DomainError::validation(
                field("tax_exemption_reason"),
                format!("item {position}: a tax exemption reason is required when the tax rate is 0"),
            ));
        }
        Ok(())
    }

    /// Trimmed exemption reason, `None` when absent or blank.
    pub fn exemption_reason(&self) -> Option<&str> {
        self.tax_exemption_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Computed amounts for one line, in the invoice's native currency.
///
/// Values are unrounded; rounding happens once when lines are aggregated or
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub item_subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_with_tax: Decimal,
}

impl ValueObject for LineTotals {}

/// Validate one line and derive its totals.
///
/// `item_subtotal = quantity * unit_price`,
/// `tax_amount = item_subtotal * tax_rate / 100`,
/// `total_with_tax = item_subtotal + tax_amount`.
pub fn compute_line(index: usize, item: &LineItemInput) -> DomainResult<LineTotals> {
    item.validate(index)?;

    let overflow = || {
        DomainError::validation(
            format!("items[{}]", index + 1),
            format!("item {}: amount is too large", index + 1),
        )
    };

    let item_subtotal = item
        .quantity
        .checked_mul(item.unit_price)
        .ok_or_else(overflow)?;
    let tax_amount = item_subtotal
        .checked_mul(item.tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(overflow)?;
    let total_with_tax = item_subtotal
        .checked_add(tax_amount)
        .ok_or_else(overflow)?;

    Ok(LineTotals {
        item_subtotal,
        tax_amount,
        total_with_tax,
    })
}
