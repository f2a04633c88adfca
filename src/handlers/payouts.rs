use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::CreatePayoutRequest;
use crate::AppState;

pub async fn create_payout(
    State(state): State<AppState>,
    Json(payload): Json<CreatePayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.payments.create_payout_transaction(&payload).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .transactions
        .find_by_id(id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
pub struct AttachSignatureRequest {
    pub signed_xdr: String,
}

pub async fn attach_signature(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachSignatureRequest>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state
        .payments
        .queue_signed_transaction(id, payload.signed_xdr)
        .await?;
    Ok(Json(transaction))
}

/// Blocking settlement wait: polls confirmation until terminal or the poll
/// budget runs out, then returns the latest record either way.
pub async fn poll_confirmation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.payments.poll_confirmation(id).await?;
    Ok(Json(transaction))
}
