//! Document renderer boundary.
//!
//! Layout engines (PDF and friends) live outside the engine; they receive a
//! [`RenderableInvoice`] and hand back bytes.

use std::fmt::Write as _;

use rust_decimal::Decimal;
use thiserror::Error;

use bizsuite_core::DomainError;
use bizsuite_invoicing::{Currency, Language, money};

use crate::store::{CompanyRecord, InvoiceItemRecord, InvoiceRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("layout failed: {0}")]
    Layout(String),

    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

impl From<RenderError> for DomainError {
    fn from(value: RenderError) -> Self {
        DomainError::render(value.to_string())
    }
}

impl From<std::fmt::Error> for RenderError {
    fn from(_: std::fmt::Error) -> Self {
        RenderError::Layout("formatter error".to_string())
    }
}

/// Everything a document needs: the persisted header, its lines in form
/// order and the issuing company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableInvoice {
    pub invoice: InvoiceRecord,
    pub items: Vec<InvoiceItemRecord>,
    pub company: CompanyRecord,
}

pub trait DocumentRenderer: Send + Sync {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;

    fn render(&self, doc: &RenderableInvoice) -> Result<Vec<u8>, RenderError>;
}

/// Deterministic UTF-8 rendering used by the HTTP surface and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

struct Labels {
    title: &'static str,
    issued: &'static str,
    due: &'static str,
    client: &'static str,
    subtotal: &'static str,
    tax: &'static str,
    total: &'static str,
    exempt: &'static str,
    notes: &'static str,
}

fn labels(language: Language) -> Labels {
    match language {
        Language::En => Labels {
            title: "INVOICE",
            issued: "Issued",
            due: "Due",
            client: "Client",
            subtotal: "Subtotal",
            tax: "Tax",
            total: "Total",
            exempt: "Tax exempt",
            notes: "Notes",
        },
        Language::Pt => Labels {
            title: "FATURA",
            issued: "Emitida",
            due: "Vencimento",
            client: "Cliente",
            subtotal: "Subtotal",
            tax: "Imposto",
            total: "Total",
            exempt: "Isento de imposto",
            notes: "Notas",
        },
    }
}

fn trim_zeros(value: Decimal) -> Decimal {
    value.normalize()
}

impl DocumentRenderer for PlainTextRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn render(&self, doc: &RenderableInvoice) -> Result<Vec<u8>, RenderError> {
        let inv = &doc.invoice.fields;
        let company = &doc.company.fields;
        let l = labels(inv.language);
        let mut out = String::new();

        writeln!(out, "{} {}", l.title, inv.invoice_number)?;
        writeln!(out, "{}: {}  {}: {}  [{}]", l.issued, inv.issue_date, l.due, inv.due_date, inv.status)?;
        writeln!(out)?;
        writeln!(out, "{} ({})", company.name, company.tax_id)?;
        writeln!(out, "{}", company.address)?;
        writeln!(out, "{} | {}", company.email, company.phone)?;
        writeln!(out, "{}: {}", l.client, inv.client_id)?;
        writeln!(out)?;

        for item in &doc.items {
            let f = &item.fields;
            writeln!(
                out,
                "{:>2}. {}  {} x {}  +{}%  = {}",
                f.position,
                f.description,
                trim_zeros(f.quantity),
                money::format(f.unit_price, inv.currency),
                trim_zeros(f.tax_rate),
                money::format(f.total_with_tax, inv.currency),
            )?;
            if f.tax_rate.is_zero() {
                if let Some(reason) = f.tax_exemption_reason.as_deref() {
                    writeln!(out, "    {}: {}", l.exempt, reason)?;
                }
            }
        }
        writeln!(out)?;

        let converted = doc.invoice.fields.converted();
        let rows = [
            (l.subtotal, inv.subtotal, &converted.subtotal),
            (l.tax, inv.tax_total, &converted.tax_total),
            (l.total, inv.total, &converted.total),
        ];
        for (label, native, amounts) in rows {
            write!(out, "{label}: {}", money::format(native, inv.currency))?;
            let others: Vec<String> = Currency::ALL
                .into_iter()
                .filter(|c| *c != inv.currency)
                .map(|c| money::format(amounts.get(c), c))
                .collect();
            writeln!(out, "  ({})", others.join(" / "))?;
        }
        writeln!(
            out,
            "1 USD = {} EUR = {} AOA; 1 EUR = {} AOA",
            trim_zeros(inv.exchange_rate_usd_to_eur),
            trim_zeros(inv.exchange_rate_usd_to_aoa),
            trim_zeros(inv.exchange_rate_eur_to_aoa),
        )?;

        if let Some(notes) = inv.notes.as_deref() {
            writeln!(out)?;
            writeln!(out, "{}: {}", l.notes, notes)?;
        }

        Ok(out.into_bytes())
    }
}
