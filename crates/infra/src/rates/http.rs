use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use bizsuite_invoicing::Currency;

use super::{ExchangeRateSource, RateSourceError, RateTable};

/// Live provider speaking the `GET {base_url}/{api_key}/latest/{base}` API.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default, rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    conversion_rates: HashMap<String, Decimal>,
}

impl HttpRateSource {
    /// Fails when the TLS backend cannot be initialised.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RateSourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RateSourceError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn url_for(&self, base: Currency) -> String {
        format!(
            "{}/{}/latest/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            base.code()
        )
    }
}

impl ExchangeRateSource for HttpRateSource {
    fn fetch_rates(&self, base: Currency) -> Result<RateTable, RateSourceError> {
        let resp = self
            .client
            .get(self.url_for(base))
            .send()
            .map_err(|e| RateSourceError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "rate provider returned a non-success status");
            return Err(RateSourceError::Provider(format!("HTTP {status}")));
        }

        let body: LatestResponse = resp
            .json()
            .map_err(|e| RateSourceError::Malformed(e.without_url().to_string()))?;
        parse_latest(base, body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn parse_latest(base: Currency, body: LatestResponse) -> Result<RateTable, RateSourceError> {
    if body.result != "success" {
        return Err(RateSourceError::Provider(
            body.error_type.unwrap_or(body.result),
        ));
    }
    if body.conversion_rates.is_empty() {
        return Err(RateSourceError::Malformed("conversion_rates is empty".to_string()));
    }
    Ok(RateTable {
        base: body.base_code.unwrap_or_else(|| base.code().to_string()),
        conversion_rates: body.conversion_rates,
    })
}
