use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::AppError;
use crate::metrics::IngressMetrics;

/// Bearer-secret check for the ingress routes. Runs before the body is read;
/// the handlers still derive the caller's tenant-bound context themselves.
pub async fn emit_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    match state
        .gateway
        .verify_ingress_secret(extract_bearer_token(req.headers()))
    {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(path = %req.uri().path(), error = %e, "Ingress request rejected");
            IngressMetrics::record_rejected("http", e.code());
            AppError::from(e).into_response()
        }
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
