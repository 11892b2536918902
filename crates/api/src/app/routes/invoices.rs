use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use bizsuite_core::InvoiceId;
use bizsuite_invoicing::InvoiceStatus;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/status", post(transition_status))
        .route("/:id/document", get(render_document))
}

fn parse_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    raw.parse::<InvoiceId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let result = tokio::task::spawn_blocking(move || {
        services.assembler.create_invoice(tenant.tenant_id(), &body)
    })
    .await;

    match result {
        Ok(Ok(created)) => (
            StatusCode::CREATED,
            Json(dto::invoice_with_items_to_json(&created.invoice, &created.items)),
        )
            .into_response(),
        Ok(Err(e)) => errors::assembly_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let result =
        tokio::task::spawn_blocking(move || services.assembler.list_invoices(tenant.tenant_id())).await;

    match result {
        Ok(Ok(invoices)) => {
            let items = invoices.iter().map(dto::invoice_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Ok(Err(e)) => errors::domain_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = tokio::task::spawn_blocking(move || {
        services.assembler.get_invoice(tenant.tenant_id(), invoice_id)
    })
    .await;

    match result {
        Ok(Ok((invoice, items))) => {
            (StatusCode::OK, Json(dto::invoice_with_items_to_json(&invoice, &items))).into_response()
        }
        Ok(Err(e)) => errors::domain_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}

pub async fn transition_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionStatusRequest>,
) -> axum::response::Response {
    let invoice_id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let next = match body.status.parse::<InvoiceStatus>() {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = tokio::task::spawn_blocking(move || {
        services
            .assembler
            .transition_status(tenant.tenant_id(), invoice_id, next)
    })
    .await;

    match result {
        Ok(Ok(invoice)) => (StatusCode::OK, Json(dto::invoice_to_json(&invoice))).into_response(),
        Ok(Err(e)) => errors::domain_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}

pub async fn render_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = tokio::task::spawn_blocking(move || {
        let renderer = services.renderer.as_ref();
        services
            .assembler
            .render_document(tenant.tenant_id(), invoice_id, renderer)
            .map(|bytes| (renderer.content_type(), bytes))
    })
    .await;

    match result {
        Ok(Ok((content_type, bytes))) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Ok(Err(e)) => errors::domain_error_to_response(e),
        Err(e) => errors::join_error(e),
    }
}
