//! Shared test fixtures: a scripted Soroban RPC mock and service builders.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use payout_core::adapters::{InMemoryAdminStore, InMemoryTransactionRepository};
use payout_core::config::PayoutConfig;
use payout_core::ports::{AdminStore, TransactionRepository};
use payout_core::services::{AdminService, CreatePayoutRequest, PaymentService, PaymentWorker};
use payout_core::stellar::envelope;
use payout_core::stellar::{
    AccountEntry, GetTransactionResult, PreparedTransaction, RpcError, SendTransactionResult,
    SorobanRpc,
};

pub const DESTINATION: &str = "GBBD47UZQ5CSKQPV456PYYH4FSYJHBWGQJUVNMCNWZ2NBEHKQPW3KXKJ";
pub const SOURCE_ACCOUNT: &str = "GAYOUTSOURCEACCOUNT";
pub const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const NETWORK_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Scripted RPC double. Responses queued with `queue_send` / `queue_get` are
/// consumed in order; with nothing queued, sends are accepted as pending and
/// status checks report success.
#[derive(Default)]
pub struct MockSorobanRpc {
    send_results: Mutex<VecDeque<Result<SendTransactionResult, RpcError>>>,
    get_results: Mutex<VecDeque<Result<GetTransactionResult, RpcError>>>,
    pub send_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub min_resource_fee: i64,
}

impl MockSorobanRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_resource_fee(fee: i64) -> Self {
        Self {
            min_resource_fee: fee,
            ..Self::default()
        }
    }

    pub fn queue_send(&self, result: Result<SendTransactionResult, RpcError>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn queue_get(&self, result: Result<GetTransactionResult, RpcError>) {
        self.get_results.lock().unwrap().push_back(result);
    }

    pub fn send_call_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SorobanRpc for MockSorobanRpc {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, RpcError> {
        Ok(AccountEntry {
            account_id: account_id.to_string(),
            sequence: 100,
        })
    }

    async fn prepare_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<PreparedTransaction, RpcError> {
        let mut parsed = envelope::decode_unverified(envelope_xdr)?;
        let fee_stroops = 100 + self.min_resource_fee;
        parsed.fee_stroops = fee_stroops;
        Ok(PreparedTransaction {
            envelope_xdr: parsed.encode()?,
            fee_stroops,
        })
    }

    async fn send_transaction(&self, signed_xdr: &str) -> Result<SendTransactionResult, RpcError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.send_results.lock().unwrap().pop_front() {
            return result;
        }
        let hash = envelope::decode_unverified(signed_xdr)?.hash_hex()?;
        Ok(SendTransactionResult::Pending { hash })
    }

    async fn get_transaction(&self, _hash: &str) -> Result<GetTransactionResult, RpcError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.get_results.lock().unwrap().pop_front() {
            return result;
        }
        Ok(GetTransactionResult::Success)
    }
}

pub fn test_config(live_execution: bool, sign_with_hot_key: bool) -> PayoutConfig {
    PayoutConfig {
        live_execution,
        sign_with_hot_key,
        max_fee_stroops: 2_000_000,
        max_attempts: 3,
        confirm_poll_ms: 1,
        confirm_max_polls: 3,
        payout_contract_id: "CPAYOUTCONTRACT".to_string(),
        payout_method_name: "distribute_winnings".to_string(),
        source_account: SOURCE_ACCOUNT.to_string(),
        hot_signer_secret: sign_with_hot_key.then(|| SEED_HEX.to_string()),
        network_passphrase: NETWORK_PASSPHRASE.to_string(),
        soroban_rpc_url: "https://soroban-testnet.stellar.org".to_string(),
        admin_token_ttl_secs: 900,
    }
}

pub struct TestHarness {
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub rpc: Arc<MockSorobanRpc>,
    pub payments: Arc<PaymentService>,
    pub worker: PaymentWorker,
    pub admin_store: Arc<InMemoryAdminStore>,
    pub admin: Arc<AdminService>,
}

pub fn harness(live_execution: bool, sign_with_hot_key: bool) -> TestHarness {
    harness_with_rpc(
        live_execution,
        sign_with_hot_key,
        Arc::new(MockSorobanRpc::new()),
    )
}

pub fn harness_with_rpc(
    live_execution: bool,
    sign_with_hot_key: bool,
    rpc: Arc<MockSorobanRpc>,
) -> TestHarness {
    let transactions = Arc::new(InMemoryTransactionRepository::new());
    let repo: Arc<dyn TransactionRepository> = transactions.clone();
    let config = test_config(live_execution, sign_with_hot_key);

    let payments = Arc::new(PaymentService::new(
        repo.clone(),
        rpc.clone() as Arc<dyn SorobanRpc>,
        config.clone(),
    ));
    let worker = PaymentWorker::new(repo.clone(), payments.clone());

    let admin_store = Arc::new(InMemoryAdminStore::new());
    let store: Arc<dyn AdminStore> = admin_store.clone();
    let admin = Arc::new(AdminService::new(
        store,
        repo,
        payments.clone(),
        config.admin_token_ttl_secs,
    ));

    TestHarness {
        transactions,
        rpc,
        payments,
        worker,
        admin_store,
        admin,
    }
}

pub fn payout_request(idempotency_key: &str) -> CreatePayoutRequest {
    CreatePayoutRequest {
        payout_id: "round-42".to_string(),
        destination_account: DESTINATION.to_string(),
        amount: "10.5".to_string(),
        asset: "XLM".to_string(),
        idempotency_key: idempotency_key.to_string(),
    }
}
