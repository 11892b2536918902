use axum::{Router, routing::get};

pub mod invoices;
pub mod rates;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/rates", get(rates::current_rates))
        .nest("/invoices", invoices::router())
}
