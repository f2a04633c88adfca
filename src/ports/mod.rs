//! Storage contracts. The settlement core depends on these traits only;
//! the adapters module provides the in-memory, Postgres, and Redis backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    AuditFilter, AuditLogEntry, AuditLogRecord, ConfirmationToken, NewConfirmationToken,
    PayoutStatus, TransactionRecord,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::DuplicateIdempotencyKey(db.message().to_string())
            }
            _ => RepositoryError::Storage(err.to_string()),
        }
    }
}

/// Partial update for a transaction record.
///
/// `id` and `created_at` are not representable here, so no update can touch
/// them. `error_message` uses a nested `Option` to distinguish "leave alone"
/// (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub status: Option<PayoutStatus>,
    pub signed_xdr: Option<String>,
    pub tx_hash: Option<String>,
    pub attempts: Option<i32>,
    pub error_message: Option<Option<String>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    /// Applies the patch in place and stamps `updated_at`. Shared by the
    /// map-based adapters; the Postgres adapter expresses the same rules in SQL.
    pub fn apply_to(&self, record: &mut TransactionRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(signed_xdr) = &self.signed_xdr {
            record.signed_xdr = Some(signed_xdr.clone());
        }
        if let Some(tx_hash) = &self.tx_hash {
            record.tx_hash = Some(tx_hash.clone());
        }
        if let Some(attempts) = self.attempts {
            record.attempts = attempts;
        }
        if let Some(error_message) = &self.error_message {
            record.error_message = error_message.clone();
        }
        if let Some(confirmed_at) = self.confirmed_at {
            record.confirmed_at = Some(confirmed_at);
        }
        record.updated_at = Utc::now();
    }
}

/// Durable ledger of payout transactions plus the per-source nonce counter.
///
/// `reserve_next_nonce` must be atomic per source account: two concurrent
/// reservations must never return the same value. Implementations push this
/// into the storage engine (counter-row upsert, `INCR`), never an in-process
/// counter.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> RepositoryResult<Option<TransactionRecord>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<TransactionRecord>>;

    async fn reserve_next_nonce(&self, source_account: &str) -> RepositoryResult<i64>;

    /// Inserts a new record. A concurrent insert with the same idempotency
    /// key fails with `DuplicateIdempotencyKey`; the caller re-reads the
    /// winning record.
    async fn insert(&self, record: &TransactionRecord) -> RepositoryResult<TransactionRecord>;

    /// Applies a partial update and returns the stored record. Errors with
    /// `NotFound` for an unknown id.
    async fn update(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> RepositoryResult<TransactionRecord>;

    /// Records in any of `statuses`, ordered oldest-created first.
    async fn list_by_status(
        &self,
        statuses: &[PayoutStatus],
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>>;
}

/// Confirmation tokens and the append-only audit log.
#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn insert_token(
        &self,
        token: NewConfirmationToken,
    ) -> RepositoryResult<ConfirmationToken>;

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> RepositoryResult<Option<ConfirmationToken>>;

    /// Marks the token used. Returns `false` when it was already used, so a
    /// raced second consumer loses even if both passed the scope checks.
    async fn consume_token(&self, id: Uuid) -> RepositoryResult<bool>;

    async fn append_audit(&self, entry: AuditLogEntry) -> RepositoryResult<AuditLogRecord>;

    /// Entries newest-first plus the total count matching the filter.
    async fn list_audit(
        &self,
        filter: &AuditFilter,
    ) -> RepositoryResult<(Vec<AuditLogRecord>, i64)>;
}
