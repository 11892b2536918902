use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use bizsuite_infra::ExchangeRateSource;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Display ticker: served from the rate cache while it is fresh.
pub async fn current_rates(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let result = tokio::task::spawn_blocking(move || {
        let now = Utc::now();
        let source = services.assembler.rate_source();
        services
            .rate_cache
            .get_or_fetch(source, now)
            .map(|cached| {
                let stale = !cached.is_fresh(now, services.rate_cache.ttl());
                dto::rates_to_json(&cached, source.name(), stale)
            })
    })
    .await;

    match result {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(e)) => errors::domain_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}
