//! Value object trait: equality by value, not identity.
//!
//! Amounts, currencies, exchange-rate sets and computed totals have no identity;
//! two of them with the same attributes are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are immutable: a conversion or rounding step produces a new
/// value instead of mutating the old one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct LineTotals { item_subtotal: Decimal, tax_amount: Decimal, total_with_tax: Decimal }
///
/// impl ValueObject for LineTotals {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
