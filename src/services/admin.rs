//! Admin authorization and audit service.
//!
//! Destructive manual interventions are gated by short-lived, single-use
//! confirmation tokens scoped to (action, resource, admin). Every guarded
//! operation writes an audit entry whether it succeeded or failed, so the
//! audit trail records attempts, not only successes.

use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    AuditFilter, AuditLogEntry, AuditLogRecord, AuditOutcome, NewConfirmationToken, PayoutStatus,
};
use crate::error::AppError;
use crate::ports::{AdminStore, TransactionPatch, TransactionRepository};
use crate::services::PaymentService;
use crate::validation::ValidationError;

pub const ACTION_FORCE_RESOLVE: &str = "force_resolve";
pub const ACTION_RESUBMIT: &str = "resubmit";
pub const ACTION_RECONCILIATION: &str = "reconciliation";
pub const RECONCILIATION_RESOURCE: &str = "global";

const ACTION_MAX_LEN: usize = 64;
const RESOURCE_ID_MAX_LEN: usize = 128;
const AUDIT_LIMIT_CAP: i64 = 200;
const AUDIT_LIMIT_DEFAULT: i64 = 50;
const RECONCILIATION_BATCH: i64 = 500;

/// Caller identity and request provenance for the audit trail. The admin id
/// arrives pre-authenticated from the front door.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestedToken {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceResolveTarget {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub dry_run: bool,
}

fn hash_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}

fn generate_raw_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct AdminService {
    store: Arc<dyn AdminStore>,
    transactions: Arc<dyn TransactionRepository>,
    payments: Arc<PaymentService>,
    token_ttl_secs: i64,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn AdminStore>,
        transactions: Arc<dyn TransactionRepository>,
        payments: Arc<PaymentService>,
        token_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            transactions,
            payments,
            token_ttl_secs,
        }
    }

    /// Issues a confirmation token. The raw value is returned exactly once;
    /// only its hash is stored.
    pub async fn request_token(
        &self,
        admin_id: &str,
        action: &str,
        resource_id: &str,
    ) -> Result<RequestedToken, AppError> {
        if action.is_empty() || action.len() > ACTION_MAX_LEN {
            return Err(ValidationError::new(
                "action",
                format!("must be between 1 and {} characters", ACTION_MAX_LEN),
            )
            .into());
        }
        if resource_id.is_empty() || resource_id.len() > RESOURCE_ID_MAX_LEN {
            return Err(ValidationError::new(
                "resource_id",
                format!("must be between 1 and {} characters", RESOURCE_ID_MAX_LEN),
            )
            .into());
        }

        let raw_token = generate_raw_token();
        let expires_at = Utc::now() + Duration::seconds(self.token_ttl_secs);

        self.store
            .insert_token(NewConfirmationToken {
                admin_id: admin_id.to_string(),
                token_hash: hash_token(&raw_token),
                action: action.to_string(),
                resource_id: resource_id.to_string(),
                expires_at,
            })
            .await?;

        tracing::info!(admin_id, action, resource_id, "issued confirmation token");

        Ok(RequestedToken {
            token: raw_token,
            expires_at,
        })
    }

    /// Verifies a raw token against (action, resource, admin) and consumes
    /// it. A token never authorizes two operations, even when the first
    /// guarded operation fails after consumption.
    pub async fn verify_and_consume_token(
        &self,
        raw_token: &str,
        action: &str,
        resource_id: &str,
        admin_id: &str,
    ) -> Result<(), AppError> {
        let record = self
            .store
            .find_token_by_hash(&hash_token(raw_token))
            .await?
            .ok_or(AppError::TokenNotFound)?;

        if record.used {
            return Err(AppError::TokenAlreadyUsed);
        }
        if record.expires_at < Utc::now() {
            return Err(AppError::TokenExpired);
        }
        if record.action != action || record.resource_id != resource_id {
            return Err(AppError::TokenScopeMismatch);
        }
        if record.admin_id != admin_id {
            return Err(AppError::TokenAdminMismatch);
        }

        if !self.store.consume_token(record.id).await? {
            // Another consumer won the race between lookup and consumption.
            return Err(AppError::TokenAlreadyUsed);
        }
        Ok(())
    }

    pub async fn log(&self, entry: AuditLogEntry) -> Result<AuditLogRecord, AppError> {
        Ok(self.store.append_audit(entry).await?)
    }

    /// Forces a transaction into a terminal state out-of-band.
    pub async fn force_resolve(
        &self,
        ctx: &AdminContext,
        tx_id: Uuid,
        token: &str,
        target: ForceResolveTarget,
    ) -> Result<crate::domain::TransactionRecord, AppError> {
        self.verify_and_consume_token(
            token,
            ACTION_FORCE_RESOLVE,
            &tx_id.to_string(),
            &ctx.admin_id,
        )
        .await?;

        let patch = match target {
            ForceResolveTarget::Confirmed => TransactionPatch {
                status: Some(PayoutStatus::Confirmed),
                confirmed_at: Some(Utc::now()),
                error_message: Some(None),
                ..Default::default()
            },
            ForceResolveTarget::Failed => TransactionPatch {
                status: Some(PayoutStatus::Failed),
                error_message: Some(Some("Force-resolved by admin".to_string())),
                ..Default::default()
            },
        };

        let result = self.transactions.update(tx_id, patch).await;
        let metadata = json!({ "target_status": target });

        match result {
            Ok(transaction) => {
                self.log(self.audit_entry(
                    ctx,
                    ACTION_FORCE_RESOLVE,
                    "transaction",
                    &tx_id.to_string(),
                    AuditOutcome::Success,
                    Some(metadata),
                    None,
                ))
                .await?;
                Ok(transaction)
            }
            Err(err) => {
                let err: AppError = err.into();
                self.log(self.audit_entry(
                    ctx,
                    ACTION_FORCE_RESOLVE,
                    "transaction",
                    &tx_id.to_string(),
                    AuditOutcome::Failed,
                    Some(metadata),
                    Some(err.to_string()),
                ))
                .await?;
                Err(err)
            }
        }
    }

    /// Requeues a failed or stuck transaction: back to `queued` with the
    /// attempt counter reset and the error cleared.
    pub async fn resubmit(
        &self,
        ctx: &AdminContext,
        tx_id: Uuid,
        token: &str,
    ) -> Result<crate::domain::TransactionRecord, AppError> {
        self.verify_and_consume_token(token, ACTION_RESUBMIT, &tx_id.to_string(), &ctx.admin_id)
            .await?;

        let result = self
            .transactions
            .update(
                tx_id,
                TransactionPatch {
                    status: Some(PayoutStatus::Queued),
                    attempts: Some(0),
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await;

        match result {
            Ok(transaction) => {
                self.log(self.audit_entry(
                    ctx,
                    ACTION_RESUBMIT,
                    "transaction",
                    &tx_id.to_string(),
                    AuditOutcome::Success,
                    None,
                    None,
                ))
                .await?;
                Ok(transaction)
            }
            Err(err) => {
                let err: AppError = err.into();
                self.log(self.audit_entry(
                    ctx,
                    ACTION_RESUBMIT,
                    "transaction",
                    &tx_id.to_string(),
                    AuditOutcome::Failed,
                    None,
                    Some(err.to_string()),
                ))
                .await?;
                Err(err)
            }
        }
    }

    /// Re-checks all in-flight (`submitted`) transactions against the
    /// network. With `dry_run` only the count is reported and nothing is
    /// mutated.
    pub async fn run_reconciliation(
        &self,
        ctx: &AdminContext,
        token: &str,
        dry_run: bool,
    ) -> Result<ReconciliationOutcome, AppError> {
        self.verify_and_consume_token(
            token,
            ACTION_RECONCILIATION,
            RECONCILIATION_RESOURCE,
            &ctx.admin_id,
        )
        .await?;

        let result = self.reconcile(dry_run).await;

        match result {
            Ok(outcome) => {
                self.log(self.audit_entry(
                    ctx,
                    ACTION_RECONCILIATION,
                    RECONCILIATION_RESOURCE,
                    RECONCILIATION_RESOURCE,
                    AuditOutcome::Success,
                    Some(json!(outcome)),
                    None,
                ))
                .await?;
                Ok(outcome)
            }
            Err(err) => {
                self.log(self.audit_entry(
                    ctx,
                    ACTION_RECONCILIATION,
                    RECONCILIATION_RESOURCE,
                    RECONCILIATION_RESOURCE,
                    AuditOutcome::Failed,
                    None,
                    Some(err.to_string()),
                ))
                .await?;
                Err(err)
            }
        }
    }

    async fn reconcile(&self, dry_run: bool) -> Result<ReconciliationOutcome, AppError> {
        let submitted = self
            .transactions
            .list_by_status(&[PayoutStatus::Submitted], RECONCILIATION_BATCH)
            .await?;

        let mut outcome = ReconciliationOutcome {
            checked: submitted.len(),
            dry_run,
            ..Default::default()
        };

        if !dry_run {
            for transaction in submitted {
                let refreshed = self
                    .payments
                    .confirm_submitted_transaction(transaction.id)
                    .await?;
                match refreshed.status {
                    PayoutStatus::Confirmed => outcome.confirmed += 1,
                    PayoutStatus::Failed => outcome.failed += 1,
                    _ => {}
                }
            }
        }

        Ok(outcome)
    }

    pub async fn list_audit_logs(
        &self,
        action: Option<String>,
        admin_id: Option<String>,
        limit: Option<i64>,
    ) -> Result<(Vec<AuditLogRecord>, i64), AppError> {
        let limit = limit.unwrap_or(AUDIT_LIMIT_DEFAULT).clamp(1, AUDIT_LIMIT_CAP);
        let filter = AuditFilter {
            action,
            admin_id,
            limit,
        };
        Ok(self.store.list_audit(&filter).await?)
    }

    #[allow(clippy::too_many_arguments)]
    fn audit_entry(
        &self,
        ctx: &AdminContext,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        outcome: AuditOutcome,
        metadata: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            admin_id: ctx.admin_id.clone(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            outcome,
            metadata,
            error_message,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        }
    }
}
