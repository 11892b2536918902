//! Invoice assembly: validate, price, convert and persist a new invoice.
//!
//! The header and its items are two separate store writes. When the items
//! write fails the header is deleted again (compensation); if that delete
//! fails too, the caller gets [`DomainError::PartialWrite`] naming the orphan.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tracing::{error, info, warn};

use bizsuite_core::{DomainError, DomainResult, InvoiceId, UserId};
use bizsuite_invoicing::money::round_storage;
use bizsuite_invoicing::{
    ConvertedTotals, ExchangeRateSet, InvoiceNumber, InvoiceStatus, InvoiceTotals, NewInvoice,
    ValidatedInvoice, convert, convert_amount, sum_lines,
};

use crate::company::resolve_company;
use crate::rates::{ExchangeRateSource, RateCache, fetch_rate_set};
use crate::render::{DocumentRenderer, RenderableInvoice};
use crate::store::records::{self, Record};
use crate::store::{
    CompanyRecord, Filter, InvoiceItemRecord, InvoiceRecord, NewInvoiceItemRow, NewInvoiceRow,
    RelationalStore, Row, SortOrder, StoreError,
};

/// How many invoice numbers are tried before a collision is reported.
pub const MAX_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyState {
    Validating,
    ResolvingCompany,
    ComputingTotals,
    ConvertingCurrencies,
    Persisting,
    Done,
    Failed(String),
}

impl core::fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AssemblyState::Validating => f.write_str("validating"),
            AssemblyState::ResolvingCompany => f.write_str("resolving_company"),
            AssemblyState::ComputingTotals => f.write_str("computing_totals"),
            AssemblyState::ConvertingCurrencies => f.write_str("converting_currencies"),
            AssemblyState::Persisting => f.write_str("persisting"),
            AssemblyState::Done => f.write_str("done"),
            AssemblyState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Creation failure, tagged with the step that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invoice assembly failed while {state}: {error}")]
pub struct AssemblyError {
    pub state: AssemblyState,
    pub error: DomainError,
}

impl From<AssemblyError> for DomainError {
    fn from(value: AssemblyError) -> Self {
        value.error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub invoice: InvoiceRecord,
    pub items: Vec<InvoiceItemRecord>,
    pub company: CompanyRecord,
    /// Every state the assembly went through, ending in `Done`.
    pub trace: Vec<AssemblyState>,
}

struct Progress {
    tenant_id: UserId,
    trace: Vec<AssemblyState>,
}

impl Progress {
    fn start(tenant_id: UserId) -> Self {
        let mut progress = Self {
            tenant_id,
            trace: Vec::new(),
        };
        progress.enter(AssemblyState::Validating);
        progress
    }

    fn current(&self) -> AssemblyState {
        self.trace.last().cloned().unwrap_or(AssemblyState::Validating)
    }

    fn enter(&mut self, state: AssemblyState) {
        info!(tenant_id = %self.tenant_id, state = %state, "invoice assembly");
        self.trace.push(state);
    }

    fn fail(&mut self, error: DomainError) -> AssemblyError {
        let state = self.current();
        warn!(tenant_id = %self.tenant_id, state = %state, error = %error, "invoice assembly failed");
        self.trace.push(AssemblyState::Failed(error.to_string()));
        AssemblyError { state, error }
    }
}

/// Orchestrates invoice creation and the read/update operations around it.
pub struct InvoiceAssembler<S, R> {
    store: S,
    rates: R,
    rate_cache: Option<Arc<RateCache>>,
    rng: Mutex<StdRng>,
}

impl<S, R> InvoiceAssembler<S, R>
where
    S: RelationalStore,
    R: ExchangeRateSource,
{
    pub fn new(store: S, rates: R) -> Self {
        Self {
            store,
            rates,
            rate_cache: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic invoice numbers, for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Share fetched rates with the display ticker.
    pub fn with_rate_cache(mut self, cache: Arc<RateCache>) -> Self {
        self.rate_cache = Some(cache);
        self
    }

    pub fn rate_source(&self) -> &R {
        &self.rates
    }

    pub fn create_invoice(
        &self,
        user_id: UserId,
        payload: &NewInvoice,
    ) -> Result<CreatedInvoice, AssemblyError> {
        let mut progress = Progress::start(user_id);

        let validated = payload.validate().map_err(|e| progress.fail(e))?;

        progress.enter(AssemblyState::ResolvingCompany);
        let company = resolve_company(&self.store, user_id).map_err(|e| progress.fail(e))?;

        progress.enter(AssemblyState::ComputingTotals);
        let totals = sum_lines(&validated.lines).map_err(|e| progress.fail(e))?;

        progress.enter(AssemblyState::ConvertingCurrencies);
        let rates = self.current_rates().map_err(|e| progress.fail(e))?;
        let converted =
            convert(validated.currency, &totals, &rates).map_err(|e| progress.fail(e))?;
        let lines = item_rows(user_id, &validated, &rates).map_err(|e| progress.fail(e))?;

        progress.enter(AssemblyState::Persisting);
        let number = self.next_number(validated.issue_date);
        let header = header_row(user_id, number, &company, &validated, &totals, &converted, &rates);
        let invoice = self
            .insert_header(header, validated.issue_date)
            .map_err(|e| progress.fail(e))?;
        let items = self
            .insert_items(&invoice, lines)
            .map_err(|e| progress.fail(e))?;

        progress.enter(AssemblyState::Done);
        info!(
            tenant_id = %user_id,
            invoice_id = %invoice.id,
            invoice_number = %invoice.fields.invoice_number,
            items = items.len(),
            "invoice created"
        );

        Ok(CreatedInvoice {
            invoice,
            items,
            company,
            trace: progress.trace,
        })
    }

    fn current_rates(&self) -> DomainResult<ExchangeRateSet> {
        if self.rates.name() == "placeholder" {
            warn!("creating invoice with placeholder exchange rates");
        }
        match &self.rate_cache {
            Some(cache) => cache.fresh(&self.rates, Utc::now()),
            None => fetch_rate_set(&self.rates),
        }
    }

    fn next_number(&self, issue_date: NaiveDate) -> InvoiceNumber {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        InvoiceNumber::generate(issue_date, &mut *rng)
    }

    fn insert_header(
        &self,
        mut header: NewInvoiceRow,
        issue_date: NaiveDate,
    ) -> DomainResult<InvoiceRecord> {
        let mut last_err = None;
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            if attempt > 1 {
                header.invoice_number = self.next_number(issue_date);
            }
            match self.store.insert(InvoiceRecord::TABLE, vec![records::encode(&header)?]) {
                Ok(stored) => return first_record(stored),
                Err(err @ StoreError::UniqueViolation { .. }) => {
                    warn!(
                        attempt,
                        invoice_number = %header.invoice_number,
                        "invoice number already taken, regenerating"
                    );
                    last_err = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(last_err
            .map(DomainError::from)
            .unwrap_or_else(|| DomainError::persistence("no invoice number attempts were made")))
    }

    fn insert_items(
        &self,
        invoice: &InvoiceRecord,
        mut lines: Vec<NewInvoiceItemRow>,
    ) -> DomainResult<Vec<InvoiceItemRecord>> {
        for line in &mut lines {
            line.invoice_id = invoice.id;
        }

        let written = lines
            .iter()
            .map(records::encode)
            .collect::<Result<Vec<Row>, StoreError>>()
            .and_then(|rows| self.store.insert(InvoiceItemRecord::TABLE, rows))
            .and_then(records::decode_all::<InvoiceItemRecord>);

        match written {
            Ok(mut items) => {
                items.sort_by_key(|i| i.fields.position);
                Ok(items)
            }
            Err(cause) => Err(self.compensate(invoice, cause)),
        }
    }

    /// Undo the header write after its items failed.
    fn compensate(&self, invoice: &InvoiceRecord, cause: StoreError) -> DomainError {
        warn!(invoice_id = %invoice.id, error = %cause, "item write failed, removing invoice header");

        let by_invoice = Filter::new()
            .eq("invoice_id", invoice.id.to_string())
            .eq("user_id", invoice.fields.user_id.to_string());
        let by_id = Filter::new()
            .eq("id", invoice.id.to_string())
            .eq("user_id", invoice.fields.user_id.to_string());

        let undone = self
            .store
            .delete(InvoiceItemRecord::TABLE, &by_invoice)
            .and_then(|_| self.store.delete(InvoiceRecord::TABLE, &by_id));

        match undone {
            Ok(_) => DomainError::from(cause),
            Err(undo_err) => {
                error!(
                    invoice_id = %invoice.id,
                    error = %undo_err,
                    "could not remove invoice header; invoice persisted without items"
                );
                DomainError::partial_write(invoice.id.to_string())
            }
        }
    }

    pub fn get_invoice(
        &self,
        user_id: UserId,
        invoice_id: InvoiceId,
    ) -> DomainResult<(InvoiceRecord, Vec<InvoiceItemRecord>)> {
        let invoice = self.load_header(user_id, invoice_id)?;
        let filter = Filter::new()
            .eq("invoice_id", invoice_id.to_string())
            .eq("user_id", user_id.to_string())
            .order_by("position", SortOrder::Asc);
        let items = records::decode_all(self.store.select(InvoiceItemRecord::TABLE, &filter)?)?;
        Ok((invoice, items))
    }

    /// Tenant's invoices, newest first.
    pub fn list_invoices(&self, user_id: UserId) -> DomainResult<Vec<InvoiceRecord>> {
        let filter = Filter::new()
            .eq("user_id", user_id.to_string())
            .order_by("created_at", SortOrder::Desc);
        Ok(records::decode_all(self.store.select(InvoiceRecord::TABLE, &filter)?)?)
    }

    pub fn transition_status(
        &self,
        user_id: UserId,
        invoice_id: InvoiceId,
        next: InvoiceStatus,
    ) -> DomainResult<InvoiceRecord> {
        let current = self.load_header(user_id, invoice_id)?;
        let from = current.fields.status;
        from.transition(next)?;

        let mut patch = Row::new();
        patch.insert("status".to_string(), json!(next.as_str()));
        // Guard on the status we read so a concurrent move is not overwritten.
        let filter = Filter::new()
            .eq("id", invoice_id.to_string())
            .eq("user_id", user_id.to_string())
            .eq("status", from.as_str());
        let updated = self.store.update(InvoiceRecord::TABLE, patch, &filter)?;
        if updated.is_empty() {
            return Err(DomainError::conflict(format!(
                "invoice {invoice_id} changed while moving it to {next}"
            )));
        }

        let record: InvoiceRecord = first_record(updated)?;
        info!(tenant_id = %user_id, invoice_id = %invoice_id, from = %from, to = %next, "invoice status changed");
        Ok(record)
    }

    pub fn render_document(
        &self,
        user_id: UserId,
        invoice_id: InvoiceId,
        renderer: &dyn DocumentRenderer,
    ) -> DomainResult<Vec<u8>> {
        let (invoice, items) = self.get_invoice(user_id, invoice_id)?;
        let filter = Filter::new()
            .eq("id", invoice.fields.company_id.to_string())
            .eq("user_id", user_id.to_string());
        let rows = self.store.select(CompanyRecord::TABLE, &filter)?;
        if rows.is_empty() {
            return Err(DomainError::not_found());
        }
        let company: CompanyRecord = first_record(rows)?;

        let doc = RenderableInvoice {
            invoice,
            items,
            company,
        };
        Ok(renderer.render(&doc)?)
    }

    fn load_header(&self, user_id: UserId, invoice_id: InvoiceId) -> DomainResult<InvoiceRecord> {
        let filter = Filter::new()
            .eq("id", invoice_id.to_string())
            .eq("user_id", user_id.to_string());
        let rows = self.store.select(InvoiceRecord::TABLE, &filter)?;
        if rows.is_empty() {
            return Err(DomainError::not_found());
        }
        first_record(rows)
    }
}

fn first_record<R: Record>(rows: Vec<Row>) -> DomainResult<R> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::persistence(format!("{} write returned no row", R::TABLE)))?;
    Ok(records::decode(row)?)
}

fn header_row(
    user_id: UserId,
    invoice_number: InvoiceNumber,
    company: &CompanyRecord,
    invoice: &ValidatedInvoice,
    totals: &InvoiceTotals,
    converted: &ConvertedTotals,
    rates: &ExchangeRateSet,
) -> NewInvoiceRow {
    NewInvoiceRow {
        user_id,
        company_id: company.id,
        client_id: invoice.client_id,
        invoice_number,
        issue_date: invoice.issue_date,
        due_date: invoice.due_date,
        currency: invoice.currency,
        language: invoice.language,
        status: InvoiceStatus::Draft,
        notes: invoice.notes.clone(),
        subtotal: totals.subtotal,
        tax_total: totals.tax_total,
        total: totals.total,
        subtotal_usd: converted.subtotal.usd,
        subtotal_eur: converted.subtotal.eur,
        subtotal_aoa: converted.subtotal.aoa,
        tax_total_usd: converted.tax_total.usd,
        tax_total_eur: converted.tax_total.eur,
        tax_total_aoa: converted.tax_total.aoa,
        total_usd: converted.total.usd,
        total_eur: converted.total.eur,
        total_aoa: converted.total.aoa,
        exchange_rate_usd_to_eur: rates.usd_eur(),
        exchange_rate_usd_to_aoa: rates.usd_aoa(),
        exchange_rate_eur_to_aoa: rates.eur_aoa(),
    }
}

/// Persistable lines, priced with the same rates as the header.
///
/// `invoice_id` is filled in once the header exists.
fn item_rows(
    user_id: UserId,
    invoice: &ValidatedInvoice,
    rates: &ExchangeRateSet,
) -> DomainResult<Vec<NewInvoiceItemRow>> {
    invoice
        .items
        .iter()
        .zip(&invoice.lines)
        .enumerate()
        .map(|(index, (item, line))| {
            let item_subtotal = round_storage(line.item_subtotal);
            let tax_amount = round_storage(line.tax_amount);
            let total_with_tax = item_subtotal + tax_amount;
            let amounts = convert_amount(total_with_tax, invoice.currency, rates)?;
            Ok(NewInvoiceItemRow {
                user_id,
                invoice_id: InvoiceId::default(),
                position: u32::try_from(index + 1)
                    .map_err(|_| DomainError::validation("items", "too many items"))?,
                description: item.description.trim().to_string(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                tax_rate: item.tax_rate,
                tax_exemption_reason: item.exemption_reason().map(str::to_string),
                item_subtotal,
                tax_amount,
                total_with_tax,
                total_with_tax_usd: amounts.usd,
                total_with_tax_eur: amounts.eur,
                total_with_tax_aoa: amounts.aoa,
                exchange_rate_usd_to_eur: rates.usd_eur(),
                exchange_rate_usd_to_aoa: rates.usd_aoa(),
                exchange_rate_eur_to_aoa: rates.eur_aoa(),
            })
        })
        .collect()
}
