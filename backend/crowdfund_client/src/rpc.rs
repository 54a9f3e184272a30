//! JSON-RPC wallet gateway client, the production [`ChainClient`].
//!
//! The gateway fronts the user's wallet and a ledger node.  Every request is
//! a JSON-RPC 2.0 POST; wallet-level refusals come back as EIP-1193 style
//! error codes.
//!
//! ## Failure mapping
//!
//! * `4001` → [`ClientError::UserRejected`]
//! * `4100`, `4900` → [`ClientError::WalletUnavailable`]
//! * any other RPC error, non-success HTTP status or transport failure →
//!   [`ClientError::Network`]
//!
//! Nothing is retried here; see [`crate::chain`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::amount::Amount;
use crate::chain::{ChainClient, ContractHandle, Identity, TxHash, TxStatus};
use crate::errors::{ClientError, Result};

const USER_REJECTED: i64 = 4001;
const UNAUTHORIZED: i64 = 4100;
const DISCONNECTED: i64 = 4900;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountResult {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct AbiEntry {
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContractResult {
    pub address: String,
    #[serde(default)]
    pub abi: Vec<AbiEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SendResult {
    #[serde(rename = "txHash")]
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub status: String,
    pub reason: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct JsonRpcChain {
    client: Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl JsonRpcChain {
    pub fn new(client: Client, rpc_url: impl Into<String>) -> Self {
        JsonRpcChain {
            client,
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("RPC {method} (id={id})");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Network(format!("{method}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(format!("{method}: {e}")))?;
        unwrap_response(method, decode_body(method, &bytes)?)
    }
}

fn decode_body<T: DeserializeOwned>(method: &str, bytes: &[u8]) -> Result<RpcResponse<T>> {
    serde_json::from_slice(bytes)
        .map_err(|e| ClientError::Network(format!("{method}: malformed response: {e}")))
}

fn unwrap_response<T>(method: &str, body: RpcResponse<T>) -> Result<T> {
    if let Some(err) = body.error {
        return Err(map_rpc_error(err));
    }
    body.result
        .ok_or_else(|| ClientError::Network(format!("Empty result from {method}")))
}

fn map_rpc_error(err: RpcError) -> ClientError {
    match err.code {
        USER_REJECTED => ClientError::UserRejected(err.message),
        UNAUTHORIZED | DISCONNECTED => ClientError::WalletUnavailable(err.message),
        code => ClientError::Network(format!("RPC error {code}: {}", err.message)),
    }
}

fn parse_status(result: StatusResult) -> Result<TxStatus> {
    match result.status.as_str() {
        "pending" => Ok(TxStatus::Pending),
        "confirmed" => Ok(TxStatus::Confirmed),
        "reverted" => Ok(TxStatus::Reverted(
            result.reason.unwrap_or_else(|| "no reason given".to_string()),
        )),
        other => Err(ClientError::Network(format!(
            "unknown transaction status {other:?}"
        ))),
    }
}

fn contract_methods(abi: &[AbiEntry]) -> Vec<String> {
    abi.iter()
        .filter(|e| e.kind.as_deref().map_or(true, |k| k.eq_ignore_ascii_case("function")))
        .filter_map(|e| e.name.clone())
        .collect()
}

#[async_trait]
impl ChainClient for JsonRpcChain {
    async fn connect(&self) -> Result<Identity> {
        let account: AccountResult = self.request("wallet_connect", json!({})).await?;
        Ok(Identity(account.address))
    }

    async fn address(&self) -> Result<Identity> {
        let account: AccountResult = self.request("wallet_address", json!({})).await?;
        Ok(Identity(account.address))
    }

    async fn get_contract(&self, address: &str) -> Result<ContractHandle> {
        let contract: ContractResult = self
            .request("contract_get", json!({ "address": address }))
            .await?;
        Ok(ContractHandle {
            methods: contract_methods(&contract.abi),
            address: contract.address,
        })
    }

    async fn call(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.request(
            "contract_call",
            json!({ "address": contract.address, "method": method, "args": args }),
        )
        .await
    }

    async fn send_transaction(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<Value>,
        call_value: Amount,
    ) -> Result<TxHash> {
        let sent: SendResult = self
            .request(
                "contract_send",
                send_params(&contract.address, method, args, call_value),
            )
            .await?;
        Ok(TxHash(sent.tx_hash))
    }

    async fn transaction_status(&self, tx: &TxHash) -> Result<TxStatus> {
        let result: StatusResult = self.request("tx_status", json!({ "txHash": tx.0 })).await?;
        parse_status(result)
    }
}

fn send_params(address: &str, method: &str, args: Vec<Value>, call_value: Amount) -> Value {
    let mut params = json!({
        "address": address,
        "method": method,
        "args": args,
    });
    if !call_value.is_zero() {
        params["callValue"] = json!(call_value.subunits().to_string());
    }
    params
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
