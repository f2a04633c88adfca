mod common;

use std::collections::HashSet;
use std::sync::Arc;

use payout_core::domain::PayoutStatus;
use payout_core::error::AppError;
use payout_core::ports::TransactionRepository;
use payout_core::services::PayoutMode;
use payout_core::stellar::envelope;

use common::{harness, harness_with_rpc, payout_request, MockSorobanRpc, NETWORK_PASSPHRASE};

#[tokio::test]
async fn test_create_in_build_only_mode() {
    let h = harness(false, false);

    let outcome = h
        .payments
        .create_payout_transaction(&payout_request("idem-build-only"))
        .await
        .unwrap();

    assert_eq!(outcome.mode, PayoutMode::BuildOnly);
    assert_eq!(outcome.transaction.status, PayoutStatus::Built);
    assert_eq!(outcome.transaction.amount_stroops, "105000000");
    assert_eq!(outcome.transaction.nonce, 1);
    assert!(outcome.transaction.signed_xdr.is_none());
    assert!(!outcome.unsigned_xdr.is_empty());

    // The unsigned payload decodes under the configured network and carries
    // the payout arguments.
    let parsed = envelope::decode(&outcome.unsigned_xdr, NETWORK_PASSPHRASE).unwrap();
    assert_eq!(parsed.invocation.amount_stroops, "105000000");
    assert_eq!(parsed.invocation.nonce, 1);
    assert_eq!(parsed.invocation.method, "distribute_winnings");
    assert!(parsed.signatures.is_empty());
}

#[tokio::test]
async fn test_create_live_without_hot_key_awaits_signature() {
    let h = harness(true, false);

    let outcome = h
        .payments
        .create_payout_transaction(&payout_request("idem-await-sig"))
        .await
        .unwrap();

    assert_eq!(outcome.mode, PayoutMode::BuildOnly);
    assert_eq!(outcome.transaction.status, PayoutStatus::AwaitingSignature);
    assert!(outcome.transaction.signed_xdr.is_none());
}

#[tokio::test]
async fn test_create_live_with_hot_key_queues_signed() {
    let h = harness(true, true);

    let outcome = h
        .payments
        .create_payout_transaction(&payout_request("idem-hot-key"))
        .await
        .unwrap();

    assert_eq!(outcome.mode, PayoutMode::Queued);
    assert_eq!(outcome.transaction.status, PayoutStatus::Queued);

    let signed = outcome.transaction.signed_xdr.expect("signed payload");
    let parsed = envelope::decode(&signed, NETWORK_PASSPHRASE).unwrap();
    assert_eq!(parsed.signatures.len(), 1);
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let h = harness(true, true);

    let first = h
        .payments
        .create_payout_transaction(&payout_request("idem-repeat"))
        .await
        .unwrap();
    let second = h
        .payments
        .create_payout_transaction(&payout_request("idem-repeat"))
        .await
        .unwrap();

    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(first.unsigned_xdr, second.unsigned_xdr);
    assert_eq!(second.transaction.nonce, 1);

    // No second nonce was reserved for the repeated key.
    assert_eq!(
        h.transactions
            .reserve_next_nonce(common::SOURCE_ACCOUNT)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_concurrent_creates_converge_on_one_record() {
    let h = harness(true, true);
    let payments = h.payments.clone();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let payments = payments.clone();
        handles.push(tokio::spawn(async move {
            payments
                .create_payout_transaction(&payout_request("idem-race"))
                .await
                .unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().transaction.id);
    }
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_consecutive_nonces() {
    let h = harness(true, true);

    let mut handles = Vec::new();
    for i in 0..8 {
        let payments = h.payments.clone();
        handles.push(tokio::spawn(async move {
            payments
                .create_payout_transaction(&payout_request(&format!("idem-nonce-{}", i)))
                .await
                .unwrap()
                .transaction
                .nonce
        }));
    }

    let mut nonces = Vec::new();
    for handle in handles {
        nonces.push(handle.await.unwrap());
    }
    nonces.sort();
    assert_eq!(nonces, (1..=8).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_validation_failures_report_fields() {
    let h = harness(false, false);

    let mut bad_destination = payout_request("idem-validate-1");
    bad_destination.destination_account = "not-an-account".to_string();
    match h
        .payments
        .create_payout_transaction(&bad_destination)
        .await
    {
        Err(AppError::Validation(err)) => assert_eq!(err.field, "destination_account"),
        other => panic!("expected validation error, got {:?}", other.map(|o| o.mode)),
    }

    let mut bad_asset = payout_request("idem-validate-2");
    bad_asset.asset = "DOGE".to_string();
    match h.payments.create_payout_transaction(&bad_asset).await {
        Err(AppError::Validation(err)) => assert_eq!(err.field, "asset"),
        other => panic!("expected validation error, got {:?}", other.map(|o| o.mode)),
    }

    let mut bad_key = payout_request("short");
    bad_key.idempotency_key = "short".to_string();
    match h.payments.create_payout_transaction(&bad_key).await {
        Err(AppError::Validation(err)) => assert_eq!(err.field, "idempotency_key"),
        other => panic!("expected validation error, got {:?}", other.map(|o| o.mode)),
    }

    let mut too_precise = payout_request("idem-validate-3");
    too_precise.amount = "1.00000001".to_string();
    match h.payments.create_payout_transaction(&too_precise).await {
        Err(AppError::Validation(err)) => assert_eq!(err.field, "amount"),
        other => panic!("expected validation error, got {:?}", other.map(|o| o.mode)),
    }

    // Nothing was persisted for any invalid request.
    assert!(h
        .transactions
        .find_by_idempotency_key("idem-validate-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fee_above_cap_rejected_at_build_time() {
    let rpc = Arc::new(MockSorobanRpc::with_min_resource_fee(5_000_000));
    let h = harness_with_rpc(true, true, rpc);

    let result = h
        .payments
        .create_payout_transaction(&payout_request("idem-fee-cap"))
        .await;

    assert!(matches!(result, Err(AppError::FeeLimitExceeded { .. })));
    assert!(h
        .transactions
        .find_by_idempotency_key("idem-fee-cap")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_queue_signed_transaction_from_awaiting_signature() {
    let h = harness(true, false);

    let outcome = h
        .payments
        .create_payout_transaction(&payout_request("idem-external-sign"))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.status, PayoutStatus::AwaitingSignature);

    let mut parsed = envelope::decode(&outcome.unsigned_xdr, NETWORK_PASSPHRASE).unwrap();
    parsed.sign(common::SEED_HEX).unwrap();
    let signed_xdr = parsed.encode().unwrap();

    let queued = h
        .payments
        .queue_signed_transaction(outcome.transaction.id, signed_xdr.clone())
        .await
        .unwrap();
    assert_eq!(queued.status, PayoutStatus::Queued);
    assert_eq!(queued.signed_xdr.as_deref(), Some(signed_xdr.as_str()));

    // A second signature for the now-queued record is rejected.
    let again = h
        .payments
        .queue_signed_transaction(outcome.transaction.id, signed_xdr)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_queue_signed_rejects_wrong_network_envelope() {
    let h = harness(true, false);

    let outcome = h
        .payments
        .create_payout_transaction(&payout_request("idem-wrong-network"))
        .await
        .unwrap();

    let mut foreign = envelope::decode(&outcome.unsigned_xdr, NETWORK_PASSPHRASE).unwrap();
    foreign.network_id = envelope::network_id("Public Global Stellar Network ; September 2015");
    let foreign_xdr = foreign.encode().unwrap();

    let result = h
        .payments
        .queue_signed_transaction(outcome.transaction.id, foreign_xdr)
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}
