//! Invoice-level totals in the native currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bizsuite_core::{DomainError, DomainResult, ValueObject};

use crate::line_item::{LineItemInput, LineTotals, compute_line};
use crate::money::{round_display, round_storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

impl ValueObject for InvoiceTotals {}

impl InvoiceTotals {
    /// Same totals rounded to display precision.
    pub fn for_display(&self) -> InvoiceTotals {
        InvoiceTotals {
            subtotal: round_display(self.subtotal),
            tax_total: round_display(self.tax_total),
            total: round_display(self.total),
        }
    }
}

/// Validate every line and sum them into invoice totals.
///
/// Lines are accumulated in input order without intermediate rounding; the
/// sums are rounded to storage precision once at the end, and `total` is
/// derived from the rounded components so `total == subtotal + tax_total` holds
/// exactly.
pub fn aggregate(items: &[LineItemInput]) -> DomainResult<InvoiceTotals> {
    let lines = compute_lines(items)?;
    sum_lines(&lines)
}

/// Validate and compute every line, preserving order.
pub fn compute_lines(items: &[LineItemInput]) -> DomainResult<Vec<LineTotals>> {
    if items.is_empty() {
        return Err(DomainError::validation("items", "items required"));
    }
    items
        .iter()
        .enumerate()
        .map(|(index, item)| compute_line(index, item))
        .collect()
}

/// Sum already computed lines.
pub fn sum_lines(lines: &[LineTotals]) -> DomainResult<InvoiceTotals> {
    if lines.is_empty() {
        return Err(DomainError::validation("items", "items required"));
    }

    let overflow = || DomainError::validation("items", "invoice total is too large");

    let mut subtotal = Decimal::ZERO;
    let mut tax_total = Decimal::ZERO;
    for line in lines {
        subtotal = subtotal.checked_add(line.item_subtotal).ok_or_else(overflow)?;
        tax_total = tax_total.checked_add(line.tax_amount).ok_or_else(overflow)?;
    }

    let subtotal = round_storage(subtotal);
    let tax_total = round_storage(tax_total);
    let total = subtotal.checked_add(tax_total).ok_or_else(overflow)?;

    Ok(InvoiceTotals {
        subtotal,
        tax_total,
        total,
    })
}
