//! Payout transaction engine.
//!
//! Owns the state machine `built` -> (`awaiting_signature` | `queued`) ->
//! `submitted` -> (`confirmed` | `failed`) and the idempotency and nonce
//! discipline around it. Network failures during submission are captured
//! into the record as terminal state, never surfaced as unhandled errors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::PayoutConfig;
use crate::domain::{Asset, PayoutStatus, TransactionRecord};
use crate::error::AppError;
use crate::ports::{RepositoryError, TransactionPatch, TransactionRepository};
use crate::stellar::envelope::{self, PayoutInvocation};
use crate::stellar::{GetTransactionResult, SendTransactionResult, SorobanRpc};
use crate::validation::{
    self, validate_amount_format, validate_destination_account, validate_idempotency_key,
    validate_payout_id, ValidationError,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayoutRequest {
    pub payout_id: String,
    pub destination_account: String,
    /// Decimal string, e.g. "10.5". Converted exactly to stroops.
    pub amount: String,
    pub asset: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    BuildOnly,
    Queued,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildPayoutOutcome {
    pub mode: PayoutMode,
    pub transaction: TransactionRecord,
    pub unsigned_xdr: String,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub transaction: TransactionRecord,
    pub submitted: bool,
}

struct ValidatedRequest {
    payout_id: String,
    destination_account: String,
    asset: Asset,
    amount_stroops: String,
    idempotency_key: String,
}

/// Converts a decimal amount string into an exact stroop count (7 decimal
/// places). Rejects excess precision, non-positive values, and anything that
/// is not a plain decimal number.
pub fn to_stroops(amount: &str) -> Result<String, ValidationError> {
    validate_amount_format(amount)?;

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    let mut padded = fraction.to_string();
    while padded.len() < validation::AMOUNT_MAX_FRACTION_DIGITS {
        padded.push('0');
    }

    let combined = format!("{}{}", whole, padded);
    let value: u128 = combined
        .parse()
        .map_err(|_| ValidationError::new("amount", "is too large"))?;
    if value == 0 {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(value.to_string())
}

fn response_mode(status: PayoutStatus) -> PayoutMode {
    if status == PayoutStatus::Queued {
        PayoutMode::Queued
    } else {
        PayoutMode::BuildOnly
    }
}

fn outcome_for(transaction: TransactionRecord) -> BuildPayoutOutcome {
    BuildPayoutOutcome {
        mode: response_mode(transaction.status),
        unsigned_xdr: transaction.unsigned_xdr.clone(),
        transaction,
    }
}

pub struct PaymentService {
    transactions: Arc<dyn TransactionRepository>,
    rpc: Arc<dyn SorobanRpc>,
    config: PayoutConfig,
}

impl PaymentService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        rpc: Arc<dyn SorobanRpc>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            transactions,
            rpc,
            config,
        }
    }

    /// Creates a payout transaction, or returns the existing record when the
    /// idempotency key has been seen before. At most one nonce reservation
    /// and one insert happen per new key, even under concurrent calls.
    pub async fn create_payout_transaction(
        &self,
        input: &CreatePayoutRequest,
    ) -> Result<BuildPayoutOutcome, AppError> {
        let request = self.validate_request(input)?;

        if let Some(existing) = self
            .transactions
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            return Ok(outcome_for(existing));
        }

        // Nonces are reserved before the build and never reused, so a failed
        // build burns its nonce.
        let nonce = self
            .transactions
            .reserve_next_nonce(&self.config.source_account)
            .await?;

        let (unsigned_xdr, fee_stroops) = self.build_prepared_envelope(&request, nonce).await?;
        tracing::debug!(
            payout_id = %request.payout_id,
            nonce,
            fee_stroops,
            "prepared payout transaction"
        );

        let mut status = PayoutStatus::Built;
        let mut signed_xdr = None;

        if self.config.live_execution {
            match (&self.config.hot_signer_secret, self.config.sign_with_hot_key) {
                (Some(secret), true) => {
                    let mut signed = envelope::decode_unverified(&unsigned_xdr)
                        .map_err(|e| AppError::Internal(e.to_string()))?;
                    signed
                        .sign(secret)
                        .map_err(|e| AppError::Internal(e.to_string()))?;
                    signed_xdr = Some(
                        signed
                            .encode()
                            .map_err(|e| AppError::Internal(e.to_string()))?,
                    );
                    status = PayoutStatus::Queued;
                }
                _ => status = PayoutStatus::AwaitingSignature,
            }
        }

        let record = TransactionRecord::new(
            request.payout_id,
            request.idempotency_key.clone(),
            self.config.source_account.clone(),
            request.destination_account,
            request.asset,
            request.amount_stroops,
            nonce,
            status,
            unsigned_xdr,
            signed_xdr,
        );

        match self.transactions.insert(&record).await {
            Ok(inserted) => {
                tracing::info!(
                    tx_id = %inserted.id,
                    status = %inserted.status,
                    nonce = inserted.nonce,
                    "created payout transaction"
                );
                Ok(outcome_for(inserted))
            }
            Err(RepositoryError::DuplicateIdempotencyKey(_)) => {
                // A concurrent creation with the same key won the insert;
                // its record is the authoritative one.
                let existing = self
                    .transactions
                    .find_by_idempotency_key(&request.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "record for idempotency key {} vanished after conflict",
                            request.idempotency_key
                        ))
                    })?;
                Ok(outcome_for(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Attaches an externally-produced signature to a `built` or
    /// `awaiting_signature` transaction and queues it for submission.
    pub async fn queue_signed_transaction(
        &self,
        id: Uuid,
        signed_xdr: String,
    ) -> Result<TransactionRecord, AppError> {
        let transaction = self.require_transaction(id).await?;

        if !matches!(
            transaction.status,
            PayoutStatus::Built | PayoutStatus::AwaitingSignature
        ) {
            return Err(AppError::Conflict(format!(
                "transaction {} is not waiting for a signature",
                id
            )));
        }

        // The payload must at least deserialize for the configured network
        // before we accept it.
        envelope::decode(&signed_xdr, &self.config.network_passphrase)
            .map_err(|e| AppError::BadRequest(format!("invalid signed envelope: {}", e)))?;

        let updated = self
            .transactions
            .update(
                id,
                TransactionPatch {
                    status: Some(PayoutStatus::Queued),
                    signed_xdr: Some(signed_xdr),
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        Ok(updated)
    }

    /// Submits a queued transaction. No-op unless the record is `queued` and
    /// live execution is enabled. Every network outcome, including transport
    /// errors, ends up in the record rather than propagating.
    pub async fn submit_queued_transaction(&self, id: Uuid) -> Result<SubmitOutcome, AppError> {
        let transaction = self.require_transaction(id).await?;

        if transaction.status != PayoutStatus::Queued || !self.config.live_execution {
            return Ok(SubmitOutcome {
                transaction,
                submitted: false,
            });
        }

        let signed_xdr = match &transaction.signed_xdr {
            Some(xdr) => xdr.clone(),
            None => {
                let failed = self
                    .fail_transaction(id, None, "Missing signed XDR for queued transaction", None)
                    .await?;
                return Ok(SubmitOutcome {
                    transaction: failed,
                    submitted: false,
                });
            }
        };

        // Bounded retries: at the cap we fail terminally without touching
        // the network.
        if transaction.attempts >= self.config.max_attempts {
            let failed = self
                .fail_transaction(
                    id,
                    None,
                    &format!(
                        "Max submit attempts reached ({})",
                        self.config.max_attempts
                    ),
                    None,
                )
                .await?;
            return Ok(SubmitOutcome {
                transaction: failed,
                submitted: false,
            });
        }

        let attempts = transaction.attempts + 1;

        match self.rpc.send_transaction(&signed_xdr).await {
            Ok(SendTransactionResult::Rejected { hash }) => {
                tracing::warn!(tx_id = %id, hash = %hash, "network rejected payout transaction");
                let failed = self
                    .fail_transaction(
                        id,
                        Some(attempts),
                        "Soroban rejected transaction during submission",
                        Some(hash),
                    )
                    .await?;
                Ok(SubmitOutcome {
                    transaction: failed,
                    submitted: false,
                })
            }
            Ok(SendTransactionResult::TryAgainLater) => {
                // Transient backpressure: stay queued, keep the attempt on
                // the books, try again on a later pass.
                let queued = self
                    .transactions
                    .update(
                        id,
                        TransactionPatch {
                            attempts: Some(attempts),
                            error_message: Some(Some(
                                "Soroban requested retry later".to_string(),
                            )),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(SubmitOutcome {
                    transaction: queued,
                    submitted: false,
                })
            }
            Ok(SendTransactionResult::Pending { hash }) => {
                tracing::info!(tx_id = %id, hash = %hash, "payout transaction submitted");
                let submitted = self
                    .transactions
                    .update(
                        id,
                        TransactionPatch {
                            status: Some(PayoutStatus::Submitted),
                            attempts: Some(attempts),
                            tx_hash: Some(hash),
                            error_message: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(SubmitOutcome {
                    transaction: submitted,
                    submitted: true,
                })
            }
            Err(err) => {
                tracing::error!(tx_id = %id, error = %err, "payout submission failed");
                let failed = self
                    .fail_transaction(id, Some(attempts), &err.to_string(), None)
                    .await?;
                Ok(SubmitOutcome {
                    transaction: failed,
                    submitted: false,
                })
            }
        }
    }

    /// Checks a submitted transaction against the network. Returns the record
    /// unchanged while the network still reports it pending; re-checking a
    /// terminal record is a no-op.
    pub async fn confirm_submitted_transaction(
        &self,
        id: Uuid,
    ) -> Result<TransactionRecord, AppError> {
        let transaction = self.require_transaction(id).await?;

        let hash = match (&transaction.status, &transaction.tx_hash) {
            (PayoutStatus::Submitted, Some(hash)) => hash.clone(),
            _ => return Ok(transaction),
        };

        match self.rpc.get_transaction(&hash).await? {
            GetTransactionResult::Success => {
                tracing::info!(tx_id = %id, hash = %hash, "payout transaction confirmed");
                let confirmed = self
                    .transactions
                    .update(
                        id,
                        TransactionPatch {
                            status: Some(PayoutStatus::Confirmed),
                            confirmed_at: Some(chrono::Utc::now()),
                            error_message: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(confirmed)
            }
            GetTransactionResult::Failed => {
                let failed = self
                    .fail_transaction(id, None, "Transaction failed on-chain", None)
                    .await?;
                Ok(failed)
            }
            GetTransactionResult::Pending => Ok(transaction),
        }
    }

    /// Bounded synchronous settlement wait: confirms repeatedly until a
    /// terminal state or the poll budget runs out, then returns the last
    /// seen record. Does not retry submission.
    pub async fn poll_confirmation(&self, id: Uuid) -> Result<TransactionRecord, AppError> {
        let mut current = self.require_transaction(id).await?;

        for _ in 0..self.config.confirm_max_polls {
            current = self.confirm_submitted_transaction(id).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            tokio::time::sleep(Duration::from_millis(self.config.confirm_poll_ms)).await;
        }

        Ok(current)
    }

    async fn require_transaction(&self, id: Uuid) -> Result<TransactionRecord, AppError> {
        self.transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    async fn fail_transaction(
        &self,
        id: Uuid,
        attempts: Option<i32>,
        message: &str,
        tx_hash: Option<String>,
    ) -> Result<TransactionRecord, AppError> {
        let failed = self
            .transactions
            .update(
                id,
                TransactionPatch {
                    status: Some(PayoutStatus::Failed),
                    attempts,
                    tx_hash,
                    error_message: Some(Some(message.to_string())),
                    ..Default::default()
                },
            )
            .await?;
        Ok(failed)
    }

    fn validate_request(&self, input: &CreatePayoutRequest) -> Result<ValidatedRequest, AppError> {
        let payout_id = input.payout_id.trim().to_string();
        let destination_account = input.destination_account.trim().to_string();
        let amount = input.amount.trim();
        let idempotency_key = input.idempotency_key.trim().to_string();

        validate_payout_id(&payout_id)?;
        validate_destination_account(&destination_account)?;
        validate_idempotency_key(&idempotency_key)?;
        let asset: Asset = input
            .asset
            .trim()
            .parse()
            .map_err(|message: String| ValidationError::new("asset", message))?;
        let amount_stroops = to_stroops(amount)?;

        Ok(ValidatedRequest {
            payout_id,
            destination_account,
            asset,
            amount_stroops,
            idempotency_key,
        })
    }

    /// Builds the unsigned envelope, prepares it against the network for the
    /// real fee, and enforces the fee cap before anything is persisted.
    async fn build_prepared_envelope(
        &self,
        request: &ValidatedRequest,
        nonce: i64,
    ) -> Result<(String, i64), AppError> {
        let account = self.rpc.get_account(&self.config.source_account).await?;

        let unsigned = envelope::build_unsigned(
            &self.config.network_passphrase,
            &self.config.source_account,
            account.sequence + 1,
            crate::stellar::client::BASE_FEE_STROOPS,
            PayoutInvocation {
                contract_id: self.config.payout_contract_id.clone(),
                method: self.config.payout_method_name.clone(),
                destination: request.destination_account.clone(),
                amount_stroops: request.amount_stroops.clone(),
                asset: request.asset,
                nonce,
                payout_id: request.payout_id.clone(),
            },
        );
        let unsigned_xdr = unsigned
            .encode()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let prepared = self.rpc.prepare_transaction(&unsigned_xdr).await?;

        if prepared.fee_stroops <= 0 {
            return Err(AppError::Internal(
                "Unable to determine prepared transaction fee".to_string(),
            ));
        }
        if prepared.fee_stroops > self.config.max_fee_stroops {
            return Err(AppError::FeeLimitExceeded {
                fee: prepared.fee_stroops,
                max: self.config.max_fee_stroops,
            });
        }

        Ok((prepared.envelope_xdr, prepared.fee_stroops))
    }
}
