//! Postgres implementations of the storage contracts.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Asset, AuditFilter, AuditLogEntry, AuditLogRecord, AuditOutcome, ConfirmationToken,
    NewConfirmationToken, PayoutStatus, TransactionRecord,
};
use crate::ports::{
    AdminStore, RepositoryError, RepositoryResult, TransactionPatch, TransactionRepository,
};

/// Postgres-backed transaction ledger.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    /// Atomic read-max-and-increment via a dedicated counter row, so two
    /// concurrent reservations for one source account never collide.
    async fn reserve_next_nonce(&self, source_account: &str) -> RepositoryResult<i64> {
        let nonce: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO payout_nonces (source_account, nonce)
            VALUES ($1, 1)
            ON CONFLICT (source_account)
            DO UPDATE SET nonce = payout_nonces.nonce + 1
            RETURNING nonce
            "#,
        )
        .bind(source_account)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(nonce)
    }

    async fn insert(&self, record: &TransactionRecord) -> RepositoryResult<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, payout_id, idempotency_key, source_account, destination_account,
                asset, amount_stroops, nonce, status, unsigned_xdr, signed_xdr,
                tx_hash, error_message, attempts, created_at, updated_at, confirmed_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(&record.payout_id)
        .bind(&record.idempotency_key)
        .bind(&record.source_account)
        .bind(&record.destination_account)
        .bind(record.asset.as_str())
        .bind(&record.amount_stroops)
        .bind(record.nonce)
        .bind(record.status.as_str())
        .bind(&record.unsigned_xdr)
        .bind(&record.signed_xdr)
        .bind(&record.tx_hash)
        .bind(&record.error_message)
        .bind(record.attempts)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.confirmed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn update(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> RepositoryResult<TransactionRecord> {
        let clear_error = patch.error_message.is_some();
        let error_message = patch.error_message.flatten();

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET
                status = COALESCE($2, status),
                signed_xdr = COALESCE($3, signed_xdr),
                tx_hash = COALESCE($4, tx_hash),
                attempts = COALESCE($5, attempts),
                error_message = CASE WHEN $6 THEN $7 ELSE error_message END,
                confirmed_at = COALESCE($8, confirmed_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.signed_xdr)
        .bind(patch.tx_hash)
        .bind(patch.attempts)
        .bind(clear_error)
        .bind(error_message)
        .bind(patch.confirmed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn list_by_status(
        &self,
        statuses: &[PayoutStatus],
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        if statuses.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE status = ANY($1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(&statuses)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    payout_id: String,
    idempotency_key: String,
    source_account: String,
    destination_account: String,
    asset: String,
    amount_stroops: String,
    nonce: i64,
    status: String,
    unsigned_xdr: String,
    signed_xdr: Option<String>,
    tx_hash: Option<String>,
    error_message: Option<String>,
    attempts: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<TransactionRecord> {
        let asset: Asset = self
            .asset
            .parse()
            .map_err(RepositoryError::Storage)?;
        let status: PayoutStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Storage)?;

        Ok(TransactionRecord {
            id: self.id,
            payout_id: self.payout_id,
            idempotency_key: self.idempotency_key,
            source_account: self.source_account,
            destination_account: self.destination_account,
            asset,
            amount_stroops: self.amount_stroops,
            nonce: self.nonce,
            status,
            unsigned_xdr: self.unsigned_xdr,
            signed_xdr: self.signed_xdr,
            tx_hash: self.tx_hash,
            error_message: self.error_message,
            attempts: self.attempts,
            created_at: self.created_at,
            updated_at: self.updated_at,
            confirmed_at: self.confirmed_at,
        })
    }
}

/// Postgres-backed confirmation tokens and audit log.
#[derive(Clone)]
pub struct PostgresAdminStore {
    pool: PgPool,
}

impl PostgresAdminStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminStore for PostgresAdminStore {
    async fn insert_token(
        &self,
        token: NewConfirmationToken,
    ) -> RepositoryResult<ConfirmationToken> {
        let row = sqlx::query_as::<_, ConfirmationTokenRow>(
            r#"
            INSERT INTO confirmation_tokens (
                id, admin_id, token_hash, action, resource_id, used, expires_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, FALSE, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.admin_id)
        .bind(&token.token_hash)
        .bind(&token.action)
        .bind(&token.resource_id)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.into_domain())
    }

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> RepositoryResult<Option<ConfirmationToken>> {
        let row = sqlx::query_as::<_, ConfirmationTokenRow>(
            "SELECT * FROM confirmation_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(ConfirmationTokenRow::into_domain))
    }

    /// Single-statement compare-and-set so concurrent consumers cannot both
    /// win the same token.
    async fn consume_token(&self, id: Uuid) -> RepositoryResult<bool> {
        let result =
            sqlx::query("UPDATE confirmation_tokens SET used = TRUE WHERE id = $1 AND used = FALSE")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(RepositoryError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> RepositoryResult<AuditLogRecord> {
        let row = sqlx::query_as::<_, AuditLogRow>(
            r#"
            INSERT INTO audit_logs (
                id, admin_id, action, resource_type, resource_id, outcome,
                metadata, error_message, ip_address, user_agent, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.admin_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.outcome.as_str())
        .bind(&entry.metadata)
        .bind(&entry.error_message)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
    ) -> RepositoryResult<(Vec<AuditLogRecord>, i64)> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::text IS NULL OR admin_id = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(&filter.action)
        .bind(&filter.admin_id)
        .bind(filter.limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::text IS NULL OR admin_id = $2)
            "#,
        )
        .bind(&filter.action)
        .bind(&filter.admin_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let entries = rows
            .into_iter()
            .map(AuditLogRow::into_domain)
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok((entries, total))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConfirmationTokenRow {
    id: Uuid,
    admin_id: String,
    token_hash: String,
    action: String,
    resource_id: String,
    used: bool,
    expires_at: chrono::DateTime<chrono::Utc>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ConfirmationTokenRow {
    fn into_domain(self) -> ConfirmationToken {
        ConfirmationToken {
            id: self.id,
            admin_id: self.admin_id,
            token_hash: self.token_hash,
            action: self.action,
            resource_id: self.resource_id,
            used: self.used,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    admin_id: String,
    action: String,
    resource_type: String,
    resource_id: String,
    outcome: String,
    metadata: Option<serde_json::Value>,
    error_message: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl AuditLogRow {
    fn into_domain(self) -> RepositoryResult<AuditLogRecord> {
        let outcome: AuditOutcome = self
            .outcome
            .parse()
            .map_err(RepositoryError::Storage)?;

        Ok(AuditLogRecord {
            id: self.id,
            admin_id: self.admin_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            outcome,
            metadata: self.metadata,
            error_message: self.error_message,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
        })
    }
}
