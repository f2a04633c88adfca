//! Soroban RPC boundary.
//!
//! The settlement core sees the network as four operations: fetch the source
//! account, prepare a transaction (fee estimation), submit a signed payload,
//! and query a transaction by hash. `SorobanRpc` is that contract;
//! `SorobanRpcClient` speaks JSON-RPC 2.0 over HTTP behind a circuit breaker.

use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use super::envelope::{self, EnvelopeError};

/// Flat base fee charged per transaction, in stroops.
pub const BASE_FEE_STROOPS: i64 = 100;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid response from Soroban RPC: {0}")]
    InvalidResponse(String),

    #[error("Soroban RPC returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Source account view needed to sequence a new transaction.
#[derive(Debug, Clone)]
pub struct AccountEntry {
    pub account_id: String,
    pub sequence: i64,
}

/// Envelope with the network-computed fee applied.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub envelope_xdr: String,
    pub fee_stroops: i64,
}

/// The three submission outcomes the core distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransactionResult {
    /// Accepted into the mempool; settlement still pending.
    Pending { hash: String },
    /// Rejected outright; the hash is retained for traceability.
    Rejected { hash: String },
    /// Transient backpressure; resubmit on a later pass.
    TryAgainLater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetTransactionResult {
    Success,
    Failed,
    /// Not yet settled (or not yet visible); poll again later.
    Pending,
}

#[async_trait]
pub trait SorobanRpc: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, RpcError>;

    async fn prepare_transaction(&self, envelope_xdr: &str)
        -> Result<PreparedTransaction, RpcError>;

    async fn send_transaction(&self, signed_xdr: &str) -> Result<SendTransactionResult, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResult, RpcError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC client for a Soroban RPC endpoint.
#[derive(Clone)]
pub struct SorobanRpcClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl SorobanRpcClient {
    /// Creates a client with the default circuit breaker (3 consecutive
    /// failures, 60-120s jittered reset).
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration.
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        SorobanRpcClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let client = self.client.clone();
        let url = self.base_url.clone();
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;
                let payload: JsonRpcResponse = response.json().await?;

                if let Some(error) = payload.error {
                    return Err(RpcError::Rpc {
                        code: error.code,
                        message: error.message,
                    });
                }

                payload
                    .result
                    .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(RpcError::CircuitBreakerOpen(
                "Soroban RPC circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl SorobanRpc for SorobanRpcClient {
    async fn get_account(&self, account_id: &str) -> Result<AccountEntry, RpcError> {
        let result = self
            .rpc_call("getAccount", json!({ "accountId": account_id }))
            .await;

        let value = match result {
            Err(RpcError::Rpc { message, .. }) if message.contains("not found") => {
                return Err(RpcError::AccountNotFound(account_id.to_string()));
            }
            other => other?,
        };

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AccountWire {
            account_id: String,
            sequence: String,
        }

        let wire: AccountWire = serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
        let sequence = wire
            .sequence
            .parse::<i64>()
            .map_err(|e| RpcError::InvalidResponse(format!("bad sequence: {}", e)))?;

        Ok(AccountEntry {
            account_id: wire.account_id,
            sequence,
        })
    }

    async fn prepare_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<PreparedTransaction, RpcError> {
        let value = self
            .rpc_call("simulateTransaction", json!({ "transaction": envelope_xdr }))
            .await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SimulationWire {
            min_resource_fee: Option<String>,
            error: Option<String>,
        }

        let wire: SimulationWire = serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = wire.error {
            return Err(RpcError::InvalidResponse(format!(
                "simulation failed: {}",
                error
            )));
        }

        let min_resource_fee = wire
            .min_resource_fee
            .ok_or_else(|| RpcError::InvalidResponse("missing minResourceFee".to_string()))?
            .parse::<i64>()
            .map_err(|e| RpcError::InvalidResponse(format!("bad minResourceFee: {}", e)))?;

        let fee_stroops = BASE_FEE_STROOPS + min_resource_fee;
        let mut envelope = envelope::decode_unverified(envelope_xdr)?;
        envelope.fee_stroops = fee_stroops;

        Ok(PreparedTransaction {
            envelope_xdr: envelope.encode()?,
            fee_stroops,
        })
    }

    async fn send_transaction(&self, signed_xdr: &str) -> Result<SendTransactionResult, RpcError> {
        let value = self
            .rpc_call("sendTransaction", json!({ "transaction": signed_xdr }))
            .await?;

        #[derive(Deserialize)]
        struct SendWire {
            status: String,
            hash: Option<String>,
        }

        let wire: SendWire = serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
        let hash = || {
            wire.hash
                .clone()
                .ok_or_else(|| RpcError::InvalidResponse("missing transaction hash".to_string()))
        };

        match wire.status.as_str() {
            // DUPLICATE means a prior attempt already reached the mempool,
            // which for our purposes is the same as pending.
            "PENDING" | "DUPLICATE" => Ok(SendTransactionResult::Pending { hash: hash()? }),
            "ERROR" => Ok(SendTransactionResult::Rejected { hash: hash()? }),
            "TRY_AGAIN_LATER" => Ok(SendTransactionResult::TryAgainLater),
            other => Err(RpcError::InvalidResponse(format!(
                "unknown send status '{}'",
                other
            ))),
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResult, RpcError> {
        let value = self.rpc_call("getTransaction", json!({ "hash": hash })).await?;

        #[derive(Deserialize)]
        struct StatusWire {
            status: String,
        }

        let wire: StatusWire = serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        match wire.status.as_str() {
            "SUCCESS" => Ok(GetTransactionResult::Success),
            "FAILED" => Ok(GetTransactionResult::Failed),
            "NOT_FOUND" => Ok(GetTransactionResult::Pending),
            other => Err(RpcError::InvalidResponse(format!(
                "unknown transaction status '{}'",
                other
            ))),
        }
    }
}
