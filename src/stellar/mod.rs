pub mod client;
pub mod envelope;

pub use client::{
    AccountEntry, GetTransactionResult, PreparedTransaction, RpcError, SendTransactionResult,
    SorobanRpc, SorobanRpcClient,
};
