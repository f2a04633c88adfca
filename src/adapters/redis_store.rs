//! Redis document-store implementation of the transaction ledger.
//!
//! Records are stored as JSON documents under `payouts:tx:{id}`, with an
//! idempotency index at `payouts:idem:{key}` and one sorted set per status
//! (scored by creation time) for oldest-first listings. Nonces use `INCR`,
//! which gives the atomic reserve-next the contract requires for free.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::domain::{PayoutStatus, TransactionRecord};
use crate::ports::{RepositoryError, RepositoryResult, TransactionPatch, TransactionRepository};

const TX_PREFIX: &str = "payouts:tx:";
const IDEMPOTENCY_PREFIX: &str = "payouts:idem:";
const NONCE_PREFIX: &str = "payouts:nonce:";
const STATUS_PREFIX: &str = "payouts:status:";

fn tx_key(id: Uuid) -> String {
    format!("{}{}", TX_PREFIX, id)
}

fn idempotency_key(key: &str) -> String {
    format!("{}{}", IDEMPOTENCY_PREFIX, key)
}

fn nonce_key(source_account: &str) -> String {
    format!("{}{}", NONCE_PREFIX, source_account)
}

fn status_key(status: PayoutStatus) -> String {
    format!("{}{}", STATUS_PREFIX, status.as_str())
}

fn storage_err(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Storage(err.to_string())
}

#[derive(Clone)]
pub struct RedisTransactionRepository {
    client: redis::Client,
}

impl RedisTransactionRepository {
    pub fn new(redis_url: &str) -> RepositoryResult<Self> {
        let client = redis::Client::open(redis_url).map_err(storage_err)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> RepositoryResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_err)
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        id: Uuid,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let raw: Option<String> = conn.get(tx_key(id)).await.map_err(storage_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(storage_err))
            .transpose()
    }

    async fn store(
        &self,
        conn: &mut MultiplexedConnection,
        record: &TransactionRecord,
    ) -> RepositoryResult<()> {
        let json = serde_json::to_string(record).map_err(storage_err)?;
        let _: () = conn.set(tx_key(record.id), json).await.map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for RedisTransactionRepository {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let mut conn = self.connection().await?;
        let id: Option<String> = conn.get(idempotency_key(key)).await.map_err(storage_err)?;
        match id {
            Some(id) => {
                let id = id.parse::<Uuid>().map_err(storage_err)?;
                self.load(&mut conn, id).await
            }
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<TransactionRecord>> {
        let mut conn = self.connection().await?;
        self.load(&mut conn, id).await
    }

    async fn reserve_next_nonce(&self, source_account: &str) -> RepositoryResult<i64> {
        let mut conn = self.connection().await?;
        let nonce: i64 = conn
            .incr(nonce_key(source_account), 1)
            .await
            .map_err(storage_err)?;
        Ok(nonce)
    }

    async fn insert(&self, record: &TransactionRecord) -> RepositoryResult<TransactionRecord> {
        let mut conn = self.connection().await?;

        // SET NX on the idempotency index is the uniqueness gate; the loser
        // of a concurrent insert sees `false` here.
        let claimed: bool = conn
            .set_nx(idempotency_key(&record.idempotency_key), record.id.to_string())
            .await
            .map_err(storage_err)?;
        if !claimed {
            return Err(RepositoryError::DuplicateIdempotencyKey(
                record.idempotency_key.clone(),
            ));
        }

        self.store(&mut conn, record).await?;
        let _: () = conn
            .zadd(
                status_key(record.status),
                record.id.to_string(),
                record.created_at.timestamp_millis(),
            )
            .await
            .map_err(storage_err)?;

        Ok(record.clone())
    }

    async fn update(
        &self,
        id: Uuid,
        patch: TransactionPatch,
    ) -> RepositoryResult<TransactionRecord> {
        let mut conn = self.connection().await?;
        let mut record = self
            .load(&mut conn, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        let previous_status = record.status;
        patch.apply_to(&mut record);

        if record.status != previous_status {
            let _: () = conn
                .zrem(status_key(previous_status), id.to_string())
                .await
                .map_err(storage_err)?;
            let _: () = conn
                .zadd(
                    status_key(record.status),
                    id.to_string(),
                    record.created_at.timestamp_millis(),
                )
                .await
                .map_err(storage_err)?;
        }

        self.store(&mut conn, &record).await?;
        Ok(record)
    }

    async fn list_by_status(
        &self,
        statuses: &[PayoutStatus],
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        if statuses.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;

        // Each status set is already creation-ordered; merge the per-status
        // heads and keep the oldest `limit` overall.
        let mut scored: Vec<(i64, String)> = Vec::new();
        for status in statuses {
            let members: Vec<(String, i64)> = conn
                .zrange_withscores(status_key(*status), 0, (limit - 1) as isize)
                .await
                .map_err(storage_err)?;
            scored.extend(members.into_iter().map(|(id, score)| (score, id)));
        }
        scored.sort();
        scored.truncate(limit as usize);

        let mut records = Vec::with_capacity(scored.len());
        for (_, id) in scored {
            let id = id.parse::<Uuid>().map_err(storage_err)?;
            if let Some(record) = self.load(&mut conn, id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
