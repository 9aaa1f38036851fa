//! [`NetworkClient`] backed by an Ethereum JSON-RPC endpoint.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node must hold the
//! signing keys for the configured accounts (Anvil, Hardhat, or a signing proxy).

use std::time::{Duration, Instant};

use alloy_core::primitives::Address;
use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::{
    CallRequest, ClientError, NetworkClient, Receipt, TransactionKind, TransactionRequest,
    TxHandle, abi,
};
use crate::{NetworkConfig, NetworkId, rpc};

/// Number of retries for read-only requests failing at the transport level.
const READ_RETRIES: usize = 3;

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(default, deserialize_with = "rpc::deserialize_opt_u64_from_hex")]
    status: Option<u64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default, deserialize_with = "rpc::deserialize_opt_u64_from_hex")]
    gas_used: Option<u64>,
}

/// Where a mined transaction stands against the required confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    /// Enough blocks on top, or reverted: the receipt is final.
    Settled(u64),
    /// Mined but still short of the required depth.
    Pending(u64),
}

impl RawReceipt {
    fn confirmation(&self, head: u64, required: u64) -> Confirmation {
        let observed = head.saturating_sub(self.block_number) + 1;

        // A reverted transaction will not succeed with more blocks on top.
        if self.status == Some(0) || observed >= required {
            Confirmation::Settled(observed)
        } else {
            Confirmation::Pending(observed)
        }
    }

    fn into_receipt(self, confirmations: u64) -> Receipt {
        Receipt {
            transaction_hash: self.transaction_hash,
            block_number: self.block_number,
            // Pre-byzantium receipts carry no status; treat them as successful.
            success: self.status.is_none_or(|status| status == 1),
            contract_address: self.contract_address,
            gas_used: self.gas_used,
            confirmations,
        }
    }
}

/// JSON-RPC network client.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcClient {
    /// Create a client for the given network.
    pub fn new(network: &NetworkConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            http: rpc::create_client(Duration::from_secs(network.rpc_timeout_secs))?,
            url: network.url.clone(),
            confirmation_timeout: Duration::from_secs(network.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(network.poll_interval_ms),
        })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Read-only request, retried when the transport fails.
    async fn read<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        let request = || rpc::json_rpc_call::<T>(&self.http, self.url.as_str(), method, params.clone());

        request
            .retry(ExponentialBuilder::default().with_max_times(READ_RETRIES))
            .when(|err| !rpc::is_node_error(err))
            .notify(|err, delay| {
                tracing::debug!(error = %err, method, ?delay, "RPC request failed, retrying...");
            })
            .await
    }

    async fn block_number(&self) -> Result<u64, anyhow::Error> {
        let block: String = self.read("eth_blockNumber", vec![]).await?;
        rpc::parse_hex_u64(&block)
    }

    fn transaction_object(request: &TransactionRequest) -> Result<Value, anyhow::Error> {
        let from = request.from.to_checksum(None);
        match &request.kind {
            TransactionKind::Deploy {
                artifact,
                interface,
                bytecode,
                args,
            } => {
                let data = abi::encode_deploy(interface, bytecode, args)
                    .with_context(|| format!("Failed to build deployment of {}", artifact))?;
                Ok(json!({
                    "from": from,
                    "data": format!("0x{}", hex::encode(data)),
                }))
            }
            TransactionKind::Invoke {
                to,
                interface,
                method,
                args,
            } => {
                let abi = abi::parse_interface(interface)?;
                let function = abi::select_function(&abi, method, args.len())?;
                let data = abi::encode_call(function, args)?;
                Ok(json!({
                    "from": from,
                    "to": to.to_checksum(None),
                    "data": format!("0x{}", hex::encode(data)),
                }))
            }
        }
    }
}

/// Turn node-side revert errors into [`ClientError::Reverted`].
fn classify(err: anyhow::Error) -> ClientError {
    match err.downcast_ref::<rpc::RpcError>() {
        Some(rpc_err) if rpc_err.is_revert() => ClientError::Reverted {
            reason: Some(rpc_err.message.clone()),
        },
        _ => ClientError::Rpc(err),
    }
}

impl NetworkClient for RpcClient {
    async fn network_id(&self) -> Result<NetworkId, ClientError> {
        let chain_id: String = self.read("eth_chainId", vec![]).await?;
        Ok(NetworkId(rpc::parse_hex_u64(&chain_id)?))
    }

    async fn accounts(&self) -> Result<Vec<Address>, ClientError> {
        Ok(self.read("eth_accounts", vec![]).await?)
    }

    async fn submit(&self, request: TransactionRequest) -> Result<TxHandle, ClientError> {
        let tx = Self::transaction_object(&request)?;

        tracing::debug!(transaction = %request, "Sending transaction");

        // Never retried: a resend could duplicate the transaction.
        let tx_hash: String =
            rpc::json_rpc_call(&self.http, self.url.as_str(), "eth_sendTransaction", vec![tx])
                .await
                .map_err(classify)?;

        Ok(TxHandle { tx_hash })
    }

    async fn wait_for_confirmations(
        &self,
        handle: &TxHandle,
        confirmations: u64,
    ) -> Result<Receipt, ClientError> {
        let start = Instant::now();
        let required = confirmations.max(1);

        loop {
            check_deadline(handle, required, start.elapsed(), self.confirmation_timeout)?;

            let raw: Option<RawReceipt> = self
                .read("eth_getTransactionReceipt", vec![json!(handle.tx_hash)])
                .await?;

            if let Some(raw) = raw {
                let head = self.block_number().await?;

                match raw.confirmation(head, required) {
                    Confirmation::Settled(observed) => return Ok(raw.into_receipt(observed)),
                    Confirmation::Pending(observed) => {
                        tracing::trace!(
                            tx_hash = %handle.tx_hash,
                            observed,
                            required,
                            "Waiting for more confirmations..."
                        );
                    }
                }
            } else {
                tracing::trace!(tx_hash = %handle.tx_hash, "Transaction not mined yet...");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn call(&self, request: CallRequest) -> Result<Vec<Value>, ClientError> {
        let abi = abi::parse_interface(&request.interface)?;
        let function = abi::select_function(&abi, &request.method, request.args.len())?;
        let data = abi::encode_call(function, &request.args)?;

        let mut tx = json!({
            "to": request.to.to_checksum(None),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = request.from {
            tx["from"] = json!(from.to_checksum(None));
        }

        let output: String =
            rpc::json_rpc_call(&self.http, self.url.as_str(), "eth_call", vec![tx, json!("latest")])
                .await
                .map_err(classify)?;

        let bytes = hex::decode(output.trim_start_matches("0x"))
            .context("Failed to decode eth_call output")?;

        Ok(abi::decode_output(function, &bytes)?)
    }
}

fn check_deadline(
    handle: &TxHandle,
    required: u64,
    waited: Duration,
    limit: Duration,
) -> Result<(), ClientError> {
    if waited > limit {
        return Err(ClientError::Timeout {
            tx_hash: handle.tx_hash.clone(),
            confirmations: required,
            waited,
        });
    }
    Ok(())
}
