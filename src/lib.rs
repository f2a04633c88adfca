pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod secrets;
pub mod services;
pub mod stellar;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::ports::{AdminStore, TransactionRepository};
use crate::services::{AdminService, PaymentService};

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionRepository>,
    pub admin_store: Arc<dyn AdminStore>,
    pub payments: Arc<PaymentService>,
    pub admin: Arc<AdminService>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payouts", post(handlers::payouts::create_payout))
        .route("/payouts/:id", get(handlers::payouts::get_payout))
        .route(
            "/payouts/:id/signature",
            post(handlers::payouts::attach_signature),
        )
        .route(
            "/payouts/:id/poll",
            post(handlers::payouts::poll_confirmation),
        )
        .route(
            "/admin/confirmation-tokens",
            post(handlers::admin::request_token),
        )
        .route(
            "/admin/transactions/:id/force-resolve",
            post(handlers::admin::force_resolve),
        )
        .route(
            "/admin/transactions/:id/resubmit",
            post(handlers::admin::resubmit),
        )
        .route(
            "/admin/reconciliation",
            post(handlers::admin::run_reconciliation),
        )
        .route("/admin/audit-logs", get(handlers::admin::list_audit_logs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
