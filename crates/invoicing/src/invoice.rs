use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

use bizsuite_core::{ClientId, DomainError, DomainResult};

use crate::currency::{Currency, Language};
use crate::line_item::{LineItemInput, LineTotals};
use crate::totals::compute_lines;

/// Invoice status lifecycle.
///
/// `draft -> sent -> paid | overdue | voided`, and an overdue invoice can
/// still be paid or voided. Transitions are user-triggered; the engine only
/// guards which ones are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Voided,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Voided => "voided",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Voided)
    }

    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Paid) | (Sent, Overdue) | (Sent, Voided) | (Overdue, Paid) | (Overdue, Voided)
        )
    }

    /// Return `next` if the move is legal, otherwise a conflict.
    pub fn transition(self, next: InvoiceStatus) -> DomainResult<InvoiceStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::conflict(format!(
                "cannot move invoice from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "voided" => Ok(InvoiceStatus::Voided),
            other => Err(DomainError::validation(
                "status",
                format!("unknown invoice status `{other}`"),
            )),
        }
    }
}

/// Human-facing invoice number, `INV-YYMM-####`.
///
/// Uniqueness is best-effort: the suffix is random, and the store's unique
/// constraint is what actually catches a collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn generate<R: Rng>(issue_date: NaiveDate, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..10_000);
        Self(format!(
            "INV-{:02}{:02}-{:04}",
            issue_date.year().rem_euclid(100),
            issue_date.month(),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InvoiceNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation("invoice_number", format!("`{s}` is not of the form INV-YYMM-####"));
        let rest = s.strip_prefix("INV-").ok_or_else(invalid)?;
        let (period, suffix) = rest.split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str, len: usize| part.len() == len && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(period, 4) || !digits(suffix, 4) {
            return Err(invalid());
        }
        let month: u32 = period[2..].parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(value: InvoiceNumber) -> Self {
        value.0
    }
}

/// Invoice creation payload, as submitted by the form.
///
/// Codes are kept as strings so unsupported values surface as domain errors
/// instead of deserialization failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub client_id: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub language: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
}

/// A creation payload that passed validation, with its per-line totals.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInvoice {
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub language: Language,
    pub notes: Option<String>,
    pub items: Vec<LineItemInput>,
    pub lines: Vec<LineTotals>,
}

impl NewInvoice {
    /// Validate the whole payload, stopping at the first problem.
    pub fn validate(&self) -> DomainResult<ValidatedInvoice> {
        let client_id = match self.client_id.as_deref().map(str::trim) {
            None | Some("") => return Err(DomainError::validation("client_id", "client is required")),
            Some(raw) => raw
                .parse::<ClientId>()
                .map_err(|_| DomainError::validation("client_id", format!("`{raw}` is not a valid client id")))?,
        };

        let currency: Currency = self.currency.parse()?;
        let language: Language = self.language.parse()?;

        if let Some(status) = self.status.as_deref() {
            if status.parse::<InvoiceStatus>()? != InvoiceStatus::Draft {
                return Err(DomainError::validation(
                    "status",
                    "new invoices must be created as draft",
                ));
            }
        }

        if self.due_date < self.issue_date {
            return Err(DomainError::validation(
                "due_date",
                "due date cannot be before the issue date",
            ));
        }

        let lines = compute_lines(&self.items)?;

        Ok(ValidatedInvoice {
            client_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            currency,
            language,
            notes: self
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            items: self.items.clone(),
            lines,
        })
    }
}
