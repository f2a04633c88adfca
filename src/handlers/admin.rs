//! Admin endpoints. Authentication happens at the gateway; these handlers
//! trust the `x-admin-id` header it injects and capture request provenance
//! for the audit trail.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::{AdminContext, ForceResolveTarget};
use crate::AppState;

fn admin_context(headers: &HeaderMap) -> Result<AdminContext, AppError> {
    let admin_id = headers
        .get("x-admin-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing admin identity".to_string()))?
        .to_string();

    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(AdminContext {
        admin_id,
        ip_address,
        user_agent,
    })
}

#[derive(Debug, Deserialize)]
pub struct RequestTokenPayload {
    pub action: String,
    pub resource_id: String,
}

pub async fn request_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestTokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = admin_context(&headers)?;
    let token = state
        .admin
        .request_token(&ctx.admin_id, &payload.action, &payload.resource_id)
        .await?;
    Ok((StatusCode::CREATED, Json(token)))
}

#[derive(Debug, Deserialize)]
pub struct ForceResolvePayload {
    pub token: String,
    pub target_status: ForceResolveTarget,
}

pub async fn force_resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ForceResolvePayload>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = admin_context(&headers)?;
    let transaction = state
        .admin
        .force_resolve(&ctx, id, &payload.token, payload.target_status)
        .await?;
    Ok(Json(json!({ "transaction": transaction })))
}

#[derive(Debug, Deserialize)]
pub struct TokenOnlyPayload {
    pub token: String,
}

pub async fn resubmit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<TokenOnlyPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = admin_context(&headers)?;
    let transaction = state.admin.resubmit(&ctx, id, &payload.token).await?;
    Ok(Json(json!({ "transaction": transaction })))
}

#[derive(Debug, Deserialize)]
pub struct ReconciliationPayload {
    pub token: String,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn run_reconciliation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReconciliationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = admin_context(&headers)?;
    let outcome = state
        .admin
        .run_reconciliation(&ctx, &payload.token, payload.dry_run)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub admin_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    admin_context(&headers)?;
    let (logs, total) = state
        .admin
        .list_audit_logs(query.action, query.admin_id, query.limit)
        .await?;
    Ok(Json(json!({ "logs": logs, "total": total })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_context_requires_identity() {
        let headers = HeaderMap::new();
        assert!(admin_context(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-id", "  ".parse().unwrap());
        assert!(admin_context(&headers).is_err());
    }

    #[test]
    fn test_admin_context_captures_provenance() {
        let mut headers = HeaderMap::new();
        headers.insert("x-admin-id", "admin-1".parse().unwrap());
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("user-agent", "ops-cli/1.0".parse().unwrap());

        let ctx = admin_context(&headers).unwrap();
        assert_eq!(ctx.admin_id, "admin-1");
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.user_agent.as_deref(), Some("ops-cli/1.0"));
    }
}
