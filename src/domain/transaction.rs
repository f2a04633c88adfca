//! Payout transaction domain entity.
//! Framework-agnostic representation of one on-chain payout attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a payout transaction.
///
/// Transitions only ever move forward:
/// `built` -> (`awaiting_signature` | `queued`) -> `submitted` -> (`confirmed` | `failed`),
/// with `queued` allowed to fail directly on submission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Built,
    AwaitingSignature,
    Queued,
    Submitted,
    Confirmed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Built => "built",
            PayoutStatus::AwaitingSignature => "awaiting_signature",
            PayoutStatus::Queued => "queued",
            PayoutStatus::Submitted => "submitted",
            PayoutStatus::Confirmed => "confirmed",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Terminal states are retained forever as the audit trail.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Confirmed | PayoutStatus::Failed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "built" => Ok(PayoutStatus::Built),
            "awaiting_signature" => Ok(PayoutStatus::AwaitingSignature),
            "queued" => Ok(PayoutStatus::Queued),
            "submitted" => Ok(PayoutStatus::Submitted),
            "confirmed" => Ok(PayoutStatus::Confirmed),
            "failed" => Ok(PayoutStatus::Failed),
            other => Err(format!("unknown payout status '{}'", other)),
        }
    }
}

/// Assets the payout contract can distribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Xlm,
    Usdc,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Xlm => "XLM",
            Asset::Usdc => "USDC",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XLM" => Ok(Asset::Xlm),
            "USDC" => Ok(Asset::Usdc),
            other => Err(format!("unsupported asset '{}'", other)),
        }
    }
}

/// Durable record of one payout transaction.
///
/// `idempotency_key` is unique across all records for all time; `nonce` is
/// unique and strictly increasing per `source_account`. `amount_stroops` is
/// the exact integer amount in the asset's smallest unit, kept as a string so
/// no floating point type ever touches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub payout_id: String,
    pub idempotency_key: String,
    pub source_account: String,
    pub destination_account: String,
    pub asset: Asset,
    pub amount_stroops: String,
    pub nonce: i64,
    pub status: PayoutStatus,
    pub unsigned_xdr: String,
    pub signed_xdr: Option<String>,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payout_id: String,
        idempotency_key: String,
        source_account: String,
        destination_account: String,
        asset: Asset,
        amount_stroops: String,
        nonce: i64,
        status: PayoutStatus,
        unsigned_xdr: String,
        signed_xdr: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payout_id,
            idempotency_key,
            source_account,
            destination_account,
            asset,
            amount_stroops,
            nonce,
            status,
            unsigned_xdr,
            signed_xdr,
            tx_hash: None,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }
}
