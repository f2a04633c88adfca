//! In-memory implementations of the storage contracts.
//!
//! Used by the test suites and the dry-run/dev profile. All state lives
//! behind a std `Mutex`; no lock is ever held across an await point.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AuditFilter, AuditLogEntry, AuditLogRecord, ConfirmationToken, NewConfirmationToken,
    PayoutStatus, TransactionRecord,
};
use crate::ports::{
    AdminStore, RepositoryError, RepositoryResult, TransactionPatch, TransactionRepository,
};

#[derive(Default)]
struct LedgerState {
    records: HashMap<Uuid, TransactionRecord>,
    idempotency_index: HashMap<String, Uuid>,
    nonce_by_source: HashMap<String, i64>,
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    state: Mutex<LedgerState>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Storage("ledger state poisoned".to_string()))
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let state = self.lock()?;
        Ok(state
            .idempotency_index
            .get(idempotency_key)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<TransactionRecord>> {
        let state = self.lock()?;
        Ok(state.records.get(&id).cloned())
    }

    async fn reserve_next_nonce(&self, source_account: &str) -> RepositoryResult<i64> {
        let mut state = self.lock()?;
        let next = state
            .nonce_by_source
            .get(source_account)
            .copied()
            .unwrap_or(0)
            + 1;
        state
            .nonce_by_source
            .insert(source_account.to_string(), next);
        Ok(next)
    }

    async fn insert(&self, record: &TransactionRecord) -> RepositoryResult<TransactionRecord> {
        let mut state = self.lock()?;
        if state
            .idempotency_index
            .contains_key(&record.idempotency_key)
        {
            return Err(RepositoryError::DuplicateIdempotencyKey(
                record.idempotency_key.clone(),
            ));
        }
        state
            .idempotency_index
            .insert(record.idempotency_key.clone(), record.id);
        state.records.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> RepositoryResult<TransactionRecord> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn list_by_status(
        &self,
        statuses: &[PayoutStatus],
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        if statuses.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }
        let state = self.lock()?;
        let mut rows: Vec<TransactionRecord> = state
            .records
            .values()
            .filter(|record| statuses.contains(&record.status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[derive(Default)]
struct AdminState {
    tokens: HashMap<Uuid, ConfirmationToken>,
    tokens_by_hash: HashMap<String, Uuid>,
    audit: Vec<AuditLogRecord>,
}

#[derive(Default)]
pub struct InMemoryAdminStore {
    state: Mutex<AdminState>,
}

impl InMemoryAdminStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, AdminState>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Storage("admin state poisoned".to_string()))
    }
}

#[async_trait]
impl AdminStore for InMemoryAdminStore {
    async fn insert_token(
        &self,
        token: NewConfirmationToken,
    ) -> RepositoryResult<ConfirmationToken> {
        let token = token.into_token();
        let mut state = self.lock()?;
        state
            .tokens_by_hash
            .insert(token.token_hash.clone(), token.id);
        state.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> RepositoryResult<Option<ConfirmationToken>> {
        let state = self.lock()?;
        Ok(state
            .tokens_by_hash
            .get(token_hash)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }

    async fn consume_token(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.lock()?;
        let token = state
            .tokens
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("confirmation token {}", id)))?;
        if token.used {
            return Ok(false);
        }
        token.used = true;
        Ok(true)
    }

    async fn append_audit(&self, entry: AuditLogEntry) -> RepositoryResult<AuditLogRecord> {
        let record = AuditLogRecord::from_entry(entry);
        let mut state = self.lock()?;
        state.audit.push(record.clone());
        Ok(record)
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
    ) -> RepositoryResult<(Vec<AuditLogRecord>, i64)> {
        let state = self.lock()?;
        let mut rows: Vec<AuditLogRecord> = state
            .audit
            .iter()
            .filter(|entry| {
                filter
                    .action
                    .as_ref()
                    .map_or(true, |action| &entry.action == action)
                    && filter
                        .admin_id
                        .as_ref()
                        .map_or(true, |admin| &entry.admin_id == admin)
            })
            .cloned()
            .collect();
        let total = rows.len() as i64;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(filter.limit.max(0) as usize);
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Asset;

    fn record(idem: &str, nonce: i64) -> TransactionRecord {
        TransactionRecord::new(
            format!("payout-{}", nonce),
            idem.to_string(),
            "GSOURCE".to_string(),
            "GDEST".to_string(),
            Asset::Xlm,
            "1".to_string(),
            nonce,
            PayoutStatus::Queued,
            "xdr".to_string(),
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_idempotency_key() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(&record("idem-00000001", 1)).await.unwrap();

        let duplicate = repo.insert(&record("idem-00000001", 2)).await;
        assert!(matches!(
            duplicate,
            Err(RepositoryError::DuplicateIdempotencyKey(_))
        ));
    }

    #[tokio::test]
    async fn test_nonce_sequence_is_per_source() {
        let repo = InMemoryTransactionRepository::new();
        assert_eq!(repo.reserve_next_nonce("GA").await.unwrap(), 1);
        assert_eq!(repo.reserve_next_nonce("GA").await.unwrap(), 2);
        assert_eq!(repo.reserve_next_nonce("GB").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_id_errors() {
        let repo = InMemoryTransactionRepository::new();
        let result = repo
            .update(Uuid::new_v4(), TransactionPatch::default())
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_consume_token_is_single_use() {
        let store = InMemoryAdminStore::new();
        let token = store
            .insert_token(NewConfirmationToken {
                admin_id: "admin-1".to_string(),
                token_hash: "hash".to_string(),
                action: "resubmit".to_string(),
                resource_id: "tx-1".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::minutes(15),
            })
            .await
            .unwrap();

        assert!(store.consume_token(token.id).await.unwrap());
        assert!(!store.consume_token(token.id).await.unwrap());
    }
}
