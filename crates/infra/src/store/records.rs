//! Typed rows for the tables the invoice engine owns.
//!
//! The store hands back untyped JSON objects. Every row is decoded into a
//! record here and checked before the rest of the engine sees it, so a row
//! with a missing column or inconsistent amounts fails at this boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use bizsuite_core::{ClientId, CompanyId, Entity, InvoiceId, InvoiceItemId, UserId};
use bizsuite_invoicing::conversion::CONSISTENCY_TOLERANCE;
use bizsuite_invoicing::{
    ConvertedTotals, Currency, CurrencyAmounts, ExchangeRateSet, InvoiceNumber, InvoiceStatus,
    InvoiceTotals, Language, from_usd,
};

use super::r#trait::{Row, StoreError};

/// A typed view of one table row.
pub trait Record: DeserializeOwned + Entity {
    const TABLE: &'static str;

    /// Row-level invariants that serde cannot express.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Decode and check one row.
pub fn decode<R: Record>(row: Row) -> Result<R, StoreError> {
    let record: R = serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| StoreError::decode(R::TABLE, e.to_string()))?;
    record
        .check()
        .map_err(|reason| StoreError::decode(R::TABLE, reason))?;
    Ok(record)
}

pub fn decode_all<R: Record>(rows: Vec<Row>) -> Result<Vec<R>, StoreError> {
    rows.into_iter().map(decode).collect()
}

/// Serialize an insert payload into a row.
pub fn encode<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::InvalidRow(other.to_string())),
        Err(e) => Err(StoreError::InvalidRow(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// companies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompany {
    pub user_id: UserId,
    pub name: String,
    pub currency: Currency,
    pub tax_id: String,
    pub address: String,
    pub email: String,
    pub phone: String,
}

impl NewCompany {
    /// Placeholder company created the first time a tenant issues an invoice.
    pub fn defaults(user_id: UserId) -> Self {
        Self {
            user_id,
            name: "My Company".to_string(),
            currency: Currency::Usd,
            tax_id: "000000000".to_string(),
            address: "Company Address".to_string(),
            email: "company@example.com".to_string(),
            phone: "000000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: CompanyId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: NewCompany,
}

impl Entity for CompanyRecord {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Record for CompanyRecord {
    const TABLE: &'static str = "companies";

    fn check(&self) -> Result<(), String> {
        if self.fields.name.trim().is_empty() {
            return Err("company name is empty".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// invoices
// ---------------------------------------------------------------------------

/// Every column of an invoice header except the store-generated ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceRow {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub client_id: ClientId,
    pub invoice_number: InvoiceNumber,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub language: Language,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub notes: Option<String>,

    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,

    pub subtotal_usd: Decimal,
    pub subtotal_eur: Decimal,
    pub subtotal_aoa: Decimal,
    pub tax_total_usd: Decimal,
    pub tax_total_eur: Decimal,
    pub tax_total_aoa: Decimal,
    pub total_usd: Decimal,
    pub total_eur: Decimal,
    pub total_aoa: Decimal,

    pub exchange_rate_usd_to_eur: Decimal,
    pub exchange_rate_usd_to_aoa: Decimal,
    pub exchange_rate_eur_to_aoa: Decimal,
}

impl NewInvoiceRow {
    pub fn native_totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            subtotal: self.subtotal,
            tax_total: self.tax_total,
            total: self.total,
        }
    }

    pub fn converted(&self) -> ConvertedTotals {
        ConvertedTotals {
            subtotal: CurrencyAmounts {
                usd: self.subtotal_usd,
                eur: self.subtotal_eur,
                aoa: self.subtotal_aoa,
            },
            tax_total: CurrencyAmounts {
                usd: self.tax_total_usd,
                eur: self.tax_total_eur,
                aoa: self.tax_total_aoa,
            },
            total: CurrencyAmounts {
                usd: self.total_usd,
                eur: self.total_eur,
                aoa: self.total_aoa,
            },
        }
    }

    pub fn rates(&self) -> bizsuite_core::DomainResult<ExchangeRateSet> {
        ExchangeRateSet::from_stored(
            self.exchange_rate_usd_to_eur,
            self.exchange_rate_usd_to_aoa,
            self.exchange_rate_eur_to_aoa,
        )
    }

    /// Recompute every currency field from the native totals and the stored
    /// rates and compare with what is stored.
    pub fn verify_consistency(&self) -> bizsuite_core::DomainResult<()> {
        let rates = self.rates()?;
        self.converted()
            .verify(self.currency, &self.native_totals(), &rates)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: NewInvoiceRow,
}

impl Entity for InvoiceRecord {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Record for InvoiceRecord {
    const TABLE: &'static str = "invoices";

    fn check(&self) -> Result<(), String> {
        self.fields.verify_consistency().map_err(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// invoice_items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItemRow {
    pub user_id: UserId,
    pub invoice_id: InvoiceId,
    /// 1-based position in the submitted form.
    pub position: u32,

    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    #[serde(default)]
    pub tax_exemption_reason: Option<String>,

    pub item_subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_with_tax: Decimal,
    pub total_with_tax_usd: Decimal,
    pub total_with_tax_eur: Decimal,
    pub total_with_tax_aoa: Decimal,

    pub exchange_rate_usd_to_eur: Decimal,
    pub exchange_rate_usd_to_aoa: Decimal,
    pub exchange_rate_eur_to_aoa: Decimal,
}

impl NewInvoiceItemRow {
    pub fn total_with_tax_in(&self) -> CurrencyAmounts {
        CurrencyAmounts {
            usd: self.total_with_tax_usd,
            eur: self.total_with_tax_eur,
            aoa: self.total_with_tax_aoa,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItemRecord {
    pub id: InvoiceItemId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: NewInvoiceItemRow,
}

impl Entity for InvoiceItemRecord {
    type Id = InvoiceItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Record for InvoiceItemRecord {
    const TABLE: &'static str = "invoice_items";

    fn check(&self) -> Result<(), String> {
        let f = &self.fields;
        if f.quantity <= Decimal::ZERO {
            return Err(format!("item {} has a non-positive quantity", f.position));
        }
        if f.item_subtotal.checked_add(f.tax_amount) != Some(f.total_with_tax) {
            return Err(format!(
                "item {} total_with_tax must equal item_subtotal + tax_amount",
                f.position
            ));
        }

        let rates = ExchangeRateSet::from_stored(
            f.exchange_rate_usd_to_eur,
            f.exchange_rate_usd_to_aoa,
            f.exchange_rate_eur_to_aoa,
        )
        .map_err(|e| e.to_string())?;
        let stored = f.total_with_tax_in();
        for target in [Currency::Eur, Currency::Aoa] {
            let expected = from_usd(stored.usd, target, &rates).map_err(|e| e.to_string())?;
            let drift = stored.get(target).checked_sub(expected).map(|d| d.abs());
            if drift.is_none_or(|d| d > CONSISTENCY_TOLERANCE) {
                return Err(format!(
                    "item {} total_with_tax_{} disagrees with the stored rates",
                    f.position,
                    target.code().to_ascii_lowercase()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn invoice_row() -> Row {
        json!({
            "id": InvoiceId::new().to_string(),
            "created_at": "2026-01-15T10:00:00.000000Z",
            "user_id": UserId::new().to_string(),
            "company_id": CompanyId::new().to_string(),
            "client_id": ClientId::new().to_string(),
            "invoice_number": "INV-2601-0042",
            "issue_date": "2026-01-15",
            "due_date": "2026-02-14",
            "currency": "USD",
            "language": "en",
            "status": "draft",
            "notes": null,
            "subtotal": 200,
            "tax_total": 28,
            "total": 228,
            "subtotal_usd": 200,
            "subtotal_eur": 170,
            "subtotal_aoa": 165000,
            "tax_total_usd": 28,
            "tax_total_eur": 23.8,
            "tax_total_aoa": 23100,
            "total_usd": 228,
            "total_eur": 193.8,
            "total_aoa": 188100,
            "exchange_rate_usd_to_eur": 0.85,
            "exchange_rate_usd_to_aoa": 825,
            "exchange_rate_eur_to_aoa": 970.588235
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn decodes_a_consistent_invoice_row() {
        let record: InvoiceRecord = decode(invoice_row()).unwrap();
        assert_eq!(record.fields.total_eur, dec!(193.8));
        assert_eq!(record.fields.status, InvoiceStatus::Draft);
        assert_eq!(record.fields.invoice_number.as_str(), "INV-2601-0042");
    }

    #[test]
    fn rejects_rows_with_tampered_conversions() {
        let mut row = invoice_row();
        row.insert("total_eur".to_string(), json!(200));
        let err = decode::<InvoiceRecord>(row).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref table, .. } if table == "invoices"));
    }

    #[test]
    fn rejects_rows_with_missing_columns() {
        let mut row = invoice_row();
        row.remove("total_aoa");
        assert!(decode::<InvoiceRecord>(row).is_err());
    }

    const DECIMAL_MAX: &str = "79228162514264337593543950335";

    fn item_row() -> Row {
        json!({
            "id": InvoiceItemId::new().to_string(),
            "created_at": "2026-01-15T10:00:00.000000Z",
            "user_id": UserId::new().to_string(),
            "invoice_id": InvoiceId::new().to_string(),
            "position": 1,
            "description": "Consulting",
            "quantity": "2",
            "unit_price": "100",
            "tax_rate": "14",
            "item_subtotal": "200",
            "tax_amount": "28",
            "total_with_tax": "228",
            "total_with_tax_usd": "228",
            "total_with_tax_eur": "193.8",
            "total_with_tax_aoa": "188100",
            "exchange_rate_usd_to_eur": "0.85",
            "exchange_rate_usd_to_aoa": "825",
            "exchange_rate_eur_to_aoa": "970.588235"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn out_of_range_invoice_amounts_are_a_decode_error() {
        let mut row = invoice_row();
        row.insert("subtotal".to_string(), json!(DECIMAL_MAX));
        row.insert("tax_total".to_string(), json!(DECIMAL_MAX));
        let err = decode::<InvoiceRecord>(row).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref table, .. } if table == "invoices"));

        let mut row = invoice_row();
        row.insert("total_aoa".to_string(), json!(format!("-{DECIMAL_MAX}")));
        assert!(matches!(decode::<InvoiceRecord>(row), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn item_rows_are_checked_at_decode() {
        let item: InvoiceItemRecord = decode(item_row()).unwrap();
        assert_eq!(item.fields.total_with_tax_in().aoa, dec!(188100));

        let mut row = item_row();
        row.insert("item_subtotal".to_string(), json!(DECIMAL_MAX));
        row.insert("tax_amount".to_string(), json!(DECIMAL_MAX));
        let err = decode::<InvoiceItemRecord>(row).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref table, .. } if table == "invoice_items"));

        let mut row = item_row();
        row.insert("total_with_tax_eur".to_string(), json!(format!("-{DECIMAL_MAX}")));
        assert!(matches!(decode::<InvoiceItemRecord>(row), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn company_defaults_round_trip_through_a_row() {
        let user = UserId::new();
        let mut row = encode(&NewCompany::defaults(user)).unwrap();
        row.insert("id".to_string(), json!(CompanyId::new().to_string()));
        row.insert("created_at".to_string(), json!("2026-01-01T00:00:00Z"));

        let company: CompanyRecord = decode(row).unwrap();
        assert_eq!(company.fields.user_id, user);
        assert_eq!(company.fields.name, "My Company");
        assert_eq!(company.fields.currency, Currency::Usd);
    }
}
