//! Settlement worker.
//!
//! Pulls actionable transactions oldest-first and advances each one by a
//! single step: queued records get a submission attempt, submitted records a
//! confirmation check. One record's failure never stops the batch.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::PayoutStatus;
use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::services::PaymentService;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub submitted: usize,
    pub confirmed: usize,
    pub failed: usize,
}

pub struct PaymentWorker {
    transactions: Arc<dyn TransactionRepository>,
    payments: Arc<PaymentService>,
}

impl PaymentWorker {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            transactions,
            payments,
        }
    }

    /// Processes up to `limit` records in `queued` or `submitted` state.
    /// Returns counters for the pass; `failed` counts records that reached
    /// the terminal failed state during this pass.
    pub async fn process_batch(&self, limit: i64) -> Result<BatchOutcome, AppError> {
        let pending = self
            .transactions
            .list_by_status(&[PayoutStatus::Queued, PayoutStatus::Submitted], limit)
            .await?;

        let mut outcome = BatchOutcome {
            processed: pending.len(),
            ..Default::default()
        };

        for transaction in pending {
            if transaction.status == PayoutStatus::Queued {
                match self.payments.submit_queued_transaction(transaction.id).await {
                    Ok(result) => {
                        if result.submitted {
                            outcome.submitted += 1;
                        }
                        if result.transaction.status == PayoutStatus::Failed {
                            outcome.failed += 1;
                        }
                    }
                    Err(e) => {
                        warn!(tx_id = %transaction.id, error = %e, "worker submit step failed");
                    }
                }
                continue;
            }

            match self
                .payments
                .confirm_submitted_transaction(transaction.id)
                .await
            {
                Ok(refreshed) => match refreshed.status {
                    PayoutStatus::Confirmed => outcome.confirmed += 1,
                    PayoutStatus::Failed => outcome.failed += 1,
                    _ => {}
                },
                Err(e) => {
                    // Record stays submitted; the next pass re-checks it.
                    warn!(tx_id = %transaction.id, error = %e, "worker confirm step failed");
                }
            }
        }

        Ok(outcome)
    }
}

/// Runs the worker on a fixed cadence. The caller is responsible for running
/// at most one of these per source account; nonce and attempt bookkeeping
/// assume a single in-flight pass.
pub async fn run_worker(worker: PaymentWorker, interval_secs: u64, batch_limit: i64) {
    info!(interval_secs, batch_limit, "settlement worker started");

    loop {
        match worker.process_batch(batch_limit).await {
            Ok(outcome) if outcome.processed > 0 => {
                info!(
                    processed = outcome.processed,
                    submitted = outcome.submitted,
                    confirmed = outcome.confirmed,
                    failed = outcome.failed,
                    "settlement batch complete"
                );
            }
            Ok(_) => debug!("settlement batch empty"),
            Err(e) => error!(error = %e, "settlement batch error"),
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}
