//! Network client boundary.
//!
//! The orchestration core only needs to submit transactions, wait for
//! confirmations and perform read-only calls. Everything ledger specific
//! (ABI encoding, JSON-RPC, receipt polling) lives behind [`NetworkClient`].

mod abi;
mod json_rpc;

use std::{fmt, future::Future, time::Duration};

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::NetworkId;

pub use abi::{abi_literal, sol_to_json};
pub use json_rpc::RpcClient;

/// Handle on a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub tx_hash: String,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
    /// Address of the created contract, for deployment transactions.
    pub contract_address: Option<Address>,
    pub gas_used: Option<u64>,
    /// Confirmations observed when the wait returned.
    pub confirmations: u64,
}

/// What a transaction does.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionKind {
    /// Create a contract from bytecode and resolved constructor arguments.
    Deploy {
        artifact: String,
        interface: Value,
        bytecode: String,
        args: Vec<Value>,
    },
    /// Call a state-changing method on a deployed contract.
    Invoke {
        to: Address,
        interface: Value,
        method: String,
        args: Vec<Value>,
    },
}

/// A transaction to be signed by `from` and sent to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub from: Address,
    pub kind: TransactionKind,
}

impl fmt::Display for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TransactionKind::Deploy { artifact, .. } => write!(f, "deploy {}", artifact),
            TransactionKind::Invoke { to, method, .. } => write!(f, "{}.{}", to, method),
        }
    }
}

/// A read-only call against a deployed contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub interface: Value,
    pub method: String,
    pub args: Vec<Value>,
}

impl CallRequest {
    /// Simulate an invoke transaction as a read-only call from the same sender.
    pub fn simulate(request: &TransactionRequest) -> Option<Self> {
        match &request.kind {
            TransactionKind::Invoke {
                to,
                interface,
                method,
                args,
            } => Some(Self {
                from: Some(request.from),
                to: *to,
                interface: interface.clone(),
                method: method.clone(),
                args: args.clone(),
            }),
            TransactionKind::Deploy { .. } => None,
        }
    }
}

/// Errors reported by a [`NetworkClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The node rejected the transaction because its execution reverted.
    #[error("execution reverted{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Reverted { reason: Option<String> },

    /// The confirmation wait exceeded its bound. The transaction may still be mined later.
    #[error("timed out after {waited:?} waiting for {confirmations} confirmation(s) of {tx_hash}")]
    Timeout {
        tx_hash: String,
        confirmations: u64,
        waited: Duration,
    },

    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

/// Access to a remote ledger.
pub trait NetworkClient: Send + Sync {
    /// The chain id of the connected network.
    fn network_id(&self) -> impl Future<Output = Result<NetworkId, ClientError>> + Send;

    /// Accounts the node can sign for, in node order.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ClientError>> + Send;

    /// Submit a transaction, returning as soon as the node accepted it.
    fn submit(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<TxHandle, ClientError>> + Send;

    /// Block until `confirmations` blocks include the transaction, or the wait times out.
    ///
    /// A reverted transaction is returned as soon as it is mined with `success == false`.
    fn wait_for_confirmations(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> impl Future<Output = Result<Receipt, ClientError>> + Send;

    /// Perform a read-only call and return the decoded outputs.
    fn call(
        &self,
        request: CallRequest,
    ) -> impl Future<Output = Result<Vec<Value>, ClientError>> + Send;
}

impl<T: NetworkClient> NetworkClient for &T {
    fn network_id(&self) -> impl Future<Output = Result<NetworkId, ClientError>> + Send {
        (**self).network_id()
    }

    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ClientError>> + Send {
        (**self).accounts()
    }

    fn submit(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<TxHandle, ClientError>> + Send {
        (**self).submit(request)
    }

    fn wait_for_confirmations(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> impl Future<Output = Result<Receipt, ClientError>> + Send {
        (**self).wait_for_confirmations(handle, confirmations)
    }

    fn call(
        &self,
        request: CallRequest,
    ) -> impl Future<Output = Result<Vec<Value>, ClientError>> + Send {
        (**self).call(request)
    }
}
