use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bizsuite_core::DomainError;
use bizsuite_infra::AssemblyError;

fn status_and_code(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::Validation { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::UnsupportedCurrency { .. } => (StatusCode::BAD_REQUEST, "unsupported_currency"),
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
        DomainError::ExchangeRate { .. } => (StatusCode::BAD_GATEWAY, "exchange_rate_error"),
        DomainError::Persistence { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
        DomainError::PartialWrite { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "partial_write"),
        DomainError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "render_error"),
        DomainError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let (status, code) = status_and_code(&err);
    let mut body = json!({
        "error": code,
        "message": err.to_string(),
    });
    if let Some(field) = err.field() {
        body["field"] = json!(field);
    }
    (status, axum::Json(body)).into_response()
}

pub fn assembly_error_to_response(err: AssemblyError) -> axum::response::Response {
    let (status, code) = status_and_code(&err.error);
    let mut body = json!({
        "error": code,
        "message": err.error.to_string(),
        "state": err.state.to_string(),
    });
    if let Some(field) = err.error.field() {
        body["field"] = json!(field);
    }
    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn join_error(err: tokio::task::JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "blocking task failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}
