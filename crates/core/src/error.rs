//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure the invoice engine can report to a caller is one of these
/// variants. Infrastructure crates keep their own error enums and convert into
/// `DomainError` at their boundary, so callers only ever match on this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input. The caller fixes the named field and resubmits.
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// A currency code outside the supported set.
    #[error("unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// Exchange rates could not be fetched or were missing/non-positive.
    #[error("exchange rates unavailable: {reason}")]
    ExchangeRate { reason: String },

    /// The backing store rejected a read or write.
    #[error("persistence failed: {cause}")]
    Persistence { cause: String },

    /// An invoice header was written but its items were not, and the header
    /// could not be removed afterwards.
    #[error("invoice {invoice_id} was persisted without its line items")]
    PartialWrite { invoice_id: String },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (tenant-scoped).
    #[error("not found")]
    NotFound,

    /// A state conflict (e.g. illegal status transition).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The document renderer could not produce output.
    #[error("document rendering failed: {0}")]
    Render(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_currency(currency: impl Into<String>) -> Self {
        Self::UnsupportedCurrency {
            currency: currency.into(),
        }
    }

    pub fn exchange_rate(reason: impl Into<String>) -> Self {
        Self::ExchangeRate {
            reason: reason.into(),
        }
    }

    pub fn persistence(cause: impl Into<String>) -> Self {
        Self::Persistence {
            cause: cause.into(),
        }
    }

    pub fn partial_write(invoice_id: impl Into<String>) -> Self {
        Self::PartialWrite {
            invoice_id: invoice_id.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Name of the offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
