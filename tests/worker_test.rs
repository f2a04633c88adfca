mod common;

use payout_core::domain::PayoutStatus;
use payout_core::ports::{TransactionPatch, TransactionRepository};
use payout_core::stellar::{GetTransactionResult, SendTransactionResult};

use common::{harness, payout_request};

#[tokio::test]
async fn test_happy_path_queued_to_confirmed() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-1"))
        .await
        .unwrap();
    assert_eq!(created.transaction.status, PayoutStatus::Queued);

    // First pass submits the queued transaction.
    let first = h.worker.process_batch(25).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.submitted, 1);
    assert_eq!(first.confirmed, 0);

    let submitted = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(submitted.status, PayoutStatus::Submitted);
    assert!(submitted.tx_hash.is_some());
    assert_eq!(submitted.attempts, 1);

    // Second pass sees the network report success.
    h.rpc.queue_get(Ok(GetTransactionResult::Success));
    let second = h.worker.process_batch(25).await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.confirmed, 1);

    let confirmed = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.status, PayoutStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
    assert!(confirmed.error_message.is_none());
}

#[tokio::test]
async fn test_network_rejection_fails_with_hash_retained() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-reject"))
        .await
        .unwrap();

    h.rpc.queue_send(Ok(SendTransactionResult::Rejected {
        hash: "h1".to_string(),
    }));
    let outcome = h.worker.process_batch(25).await.unwrap();
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.submitted, 0);

    let failed = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.tx_hash.as_deref(), Some("h1"));
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("rejected"));
}

#[tokio::test]
async fn test_try_again_later_keeps_transaction_queued() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-backpressure"))
        .await
        .unwrap();

    h.rpc.queue_send(Ok(SendTransactionResult::TryAgainLater));
    let outcome = h.worker.process_batch(25).await.unwrap();
    assert_eq!(outcome.submitted, 0);
    assert_eq!(outcome.failed, 0);

    let queued = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queued.status, PayoutStatus::Queued);
    assert_eq!(queued.attempts, 1);
    assert!(queued.tx_hash.is_none());

    // The next pass retries and succeeds.
    let retry = h.worker.process_batch(25).await.unwrap();
    assert_eq!(retry.submitted, 1);
    let submitted = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(submitted.status, PayoutStatus::Submitted);
    assert_eq!(submitted.attempts, 2);
}

#[tokio::test]
async fn test_attempt_cap_fails_without_network_call() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-attempt-cap"))
        .await
        .unwrap();

    // Config in the harness caps attempts at 3.
    h.transactions
        .update(
            created.transaction.id,
            TransactionPatch {
                attempts: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let baseline = h.rpc.send_call_count();
    let result = h
        .payments
        .submit_queued_transaction(created.transaction.id)
        .await
        .unwrap();

    assert!(!result.submitted);
    assert_eq!(result.transaction.status, PayoutStatus::Failed);
    assert!(result
        .transaction
        .error_message
        .as_deref()
        .unwrap()
        .contains("Max submit attempts"));
    assert_eq!(h.rpc.send_call_count(), baseline);
}

#[tokio::test]
async fn test_missing_signed_xdr_fails_immediately() {
    let h = harness(true, false);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-no-signature"))
        .await
        .unwrap();
    assert_eq!(created.transaction.status, PayoutStatus::AwaitingSignature);

    // Force the record into queued without ever attaching a signature.
    h.transactions
        .update(
            created.transaction.id,
            TransactionPatch {
                status: Some(PayoutStatus::Queued),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h
        .payments
        .submit_queued_transaction(created.transaction.id)
        .await
        .unwrap();
    assert_eq!(result.transaction.status, PayoutStatus::Failed);
    assert!(result
        .transaction
        .error_message
        .as_deref()
        .unwrap()
        .contains("Missing signed XDR"));
    assert_eq!(h.rpc.send_call_count(), 0);
}

#[tokio::test]
async fn test_transport_error_is_captured_as_failed_record() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-transport"))
        .await
        .unwrap();

    h.rpc.queue_send(Err(
        payout_core::stellar::RpcError::InvalidResponse("connection reset".to_string()),
    ));
    let outcome = h.worker.process_batch(25).await.unwrap();
    assert_eq!(outcome.failed, 1);

    let failed = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("connection reset"));
}

#[tokio::test]
async fn test_lifecycle_never_regresses() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-forward-only"))
        .await
        .unwrap();

    // Drive to confirmed.
    h.worker.process_batch(25).await.unwrap();
    h.rpc.queue_get(Ok(GetTransactionResult::Success));
    h.worker.process_batch(25).await.unwrap();

    let confirmed = h
        .transactions
        .find_by_id(created.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.status, PayoutStatus::Confirmed);

    // Re-confirming is a no-op returning the same record.
    let again = h
        .payments
        .confirm_submitted_transaction(created.transaction.id)
        .await
        .unwrap();
    assert_eq!(again.status, PayoutStatus::Confirmed);
    assert_eq!(again.updated_at, confirmed.updated_at);

    // Submitting a terminal record is a no-op as well.
    let submit = h
        .payments
        .submit_queued_transaction(created.transaction.id)
        .await
        .unwrap();
    assert!(!submit.submitted);
    assert_eq!(submit.transaction.status, PayoutStatus::Confirmed);
}

#[tokio::test]
async fn test_poll_confirmation_returns_on_terminal_state() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-poll"))
        .await
        .unwrap();
    h.worker.process_batch(25).await.unwrap();

    h.rpc.queue_get(Ok(GetTransactionResult::Pending));
    h.rpc.queue_get(Ok(GetTransactionResult::Success));

    let settled = h
        .payments
        .poll_confirmation(created.transaction.id)
        .await
        .unwrap();
    assert_eq!(settled.status, PayoutStatus::Confirmed);
}

#[tokio::test]
async fn test_poll_confirmation_exhausts_budget_without_error() {
    let h = harness(true, true);

    let created = h
        .payments
        .create_payout_transaction(&payout_request("idem-poll-budget"))
        .await
        .unwrap();
    h.worker.process_batch(25).await.unwrap();

    // Harness budget is 3 polls; the network stays pending throughout.
    for _ in 0..3 {
        h.rpc.queue_get(Ok(GetTransactionResult::Pending));
    }

    let unsettled = h
        .payments
        .poll_confirmation(created.transaction.id)
        .await
        .unwrap();
    assert_eq!(unsettled.status, PayoutStatus::Submitted);
}

#[tokio::test]
async fn test_batch_respects_limit_and_order() {
    let h = harness(true, true);

    for i in 0..3 {
        h.payments
            .create_payout_transaction(&payout_request(&format!("idem-batch-{}", i)))
            .await
            .unwrap();
    }

    let outcome = h.worker.process_batch(2).await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.submitted, 2);

    let remaining = h
        .transactions
        .list_by_status(&[PayoutStatus::Queued], 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}
