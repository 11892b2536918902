use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use bizsuite_infra::rates::CachedRates;
use bizsuite_infra::store::{InvoiceItemRecord, InvoiceRecord};
use bizsuite_invoicing::money::format;
use bizsuite_invoicing::{Currency, CurrencyAmounts};

// -------------------------
// Request DTOs
// -------------------------

/// `POST /invoices` takes the engine's creation payload as-is.
pub use bizsuite_invoicing::NewInvoice as CreateInvoiceRequest;

#[derive(Debug, Deserialize)]
pub struct TransitionStatusRequest {
    pub status: String,
}

// -------------------------
// Response mapping
// -------------------------

fn formatted(amounts: &CurrencyAmounts) -> JsonValue {
    let mut out = serde_json::Map::new();
    for currency in Currency::ALL {
        out.insert(currency.code().to_string(), json!(format(amounts.get(currency), currency)));
    }
    JsonValue::Object(out)
}

/// Invoice header as JSON, with display strings for the three totals.
pub fn invoice_to_json(invoice: &InvoiceRecord) -> JsonValue {
    let mut value = serde_json::to_value(invoice).unwrap_or_else(|_| json!({}));
    let converted = invoice.fields.converted();
    value["display"] = json!({
        "subtotal": formatted(&converted.subtotal),
        "tax_total": formatted(&converted.tax_total),
        "total": formatted(&converted.total),
    });
    value
}

pub fn invoice_with_items_to_json(invoice: &InvoiceRecord, items: &[InvoiceItemRecord]) -> JsonValue {
    let mut value = invoice_to_json(invoice);
    value["items"] = serde_json::to_value(items).unwrap_or_else(|_| json!([]));
    value
}

pub fn rates_to_json(cached: &CachedRates, source: &str, stale: bool) -> JsonValue {
    json!({
        "base": "USD",
        "usd_eur": cached.rates.usd_eur(),
        "usd_aoa": cached.rates.usd_aoa(),
        "eur_aoa": cached.rates.eur_aoa(),
        "fetched_at": cached.fetched_at,
        "source": source,
        "stale": stale,
    })
}
