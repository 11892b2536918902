//! Invoice computation and currency conversion.
//!
//! This crate contains the deterministic business rules behind an invoice:
//! per-line totals, invoice totals, and their USD/EUR/AOA equivalents. No IO,
//! no HTTP, no storage.

pub mod conversion;
pub mod currency;
pub mod invoice;
pub mod line_item;
pub mod money;
pub mod totals;

pub use conversion::{
    ConvertedTotals, CurrencyAmounts, ExchangeRateSet, convert, convert_amount, from_usd, to_usd,
};
pub use currency::{Currency, Language};
pub use invoice::{InvoiceNumber, InvoiceStatus, NewInvoice, ValidatedInvoice};
pub use line_item::{LineItemInput, LineTotals, compute_line};
pub use totals::{InvoiceTotals, aggregate, compute_lines, sum_lines};
