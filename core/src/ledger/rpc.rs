//! JSON-RPC transport to the chain node.
//!
//! RULE: only this module speaks the wire protocol. The client above it
//! works in terms of `RpcTransport` so tests can script node behavior.

use super::{
    address::ChainAddress,
    hash::{from_hex, to_prefixed_hex},
};
use crate::error::{LedgerError, LedgerResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A read-only contract call or a gas estimate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<ChainAddress>,
    pub to: ChainAddress,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` when the transaction was mined but reverted.
    pub succeeded: bool,
    pub effective_gas_price: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub tx_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub gas_price: u128,
    pub block_number: Option<u64>,
}

/// The node operations the ledger client depends on.
pub trait RpcTransport: Send + Sync {
    fn chain_id(&self) -> LedgerResult<u64>;
    fn block_number(&self) -> LedgerResult<u64>;
    fn code_at(&self, address: &ChainAddress) -> LedgerResult<Vec<u8>>;
    fn balance(&self, address: &ChainAddress) -> LedgerResult<u128>;
    /// Next nonce including pending transactions.
    fn pending_nonce(&self, address: &ChainAddress) -> LedgerResult<u64>;
    fn estimate_gas(&self, call: &CallRequest) -> LedgerResult<u64>;
    fn call(&self, call: &CallRequest) -> LedgerResult<Vec<u8>>;
    /// Broadcasts a signed payload and returns the transaction hash.
    fn send_raw_transaction(&self, raw: &[u8]) -> LedgerResult<String>;
    fn transaction_receipt(&self, tx_hash: &str) -> LedgerResult<Option<TransactionReceipt>>;
    fn transaction(&self, tx_hash: &str) -> LedgerResult<Option<TransactionInfo>>;
    fn block_timestamp(&self, block_number: u64) -> LedgerResult<Option<u64>>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct JsonRpcTransport {
    agent: ureq::Agent,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(url: &str, connect_timeout_ms: u64, request_timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(connect_timeout_ms))
            .timeout_read(Duration::from_millis(request_timeout_ms))
            .timeout_write(Duration::from_millis(request_timeout_ms))
            .build();
        Self {
            agent,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    fn request(&self, method: &str, params: Value) -> LedgerResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = match self.agent.post(&self.url).send_json(body) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => {
                return Err(LedgerError::Connectivity(format!(
                    "{method}: node answered http status {code}"
                )))
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(LedgerError::Connectivity(format!("{method}: {transport}")))
            }
        };
        let parsed: RpcResponse = response
            .into_json()
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn call_object(call: &CallRequest) -> Value {
        let mut obj = json!({
            "to": call.to.to_checksum(),
            "data": to_prefixed_hex(&call.data),
        });
        if let Some(from) = &call.from {
            obj["from"] = Value::String(from.to_checksum());
        }
        obj
    }
}

/// Parses a hex quantity such as `"0x1a"`.
pub fn parse_quantity(value: &Value) -> LedgerResult<u128> {
    let raw = value
        .as_str()
        .ok_or_else(|| LedgerError::Decode(format!("expected hex quantity, got {value}")))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode(format!("{raw}: {e}")))
}

fn parse_u64(value: &Value) -> LedgerResult<u64> {
    let q = parse_quantity(value)?;
    u64::try_from(q).map_err(|_| LedgerError::Decode(format!("{q} does not fit u64")))
}

fn parse_data(value: &Value) -> LedgerResult<Vec<u8>> {
    value
        .as_str()
        .and_then(from_hex)
        .ok_or_else(|| LedgerError::Decode(format!("expected hex data, got {value}")))
}

fn parse_string(value: &Value, field: &str) -> LedgerResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::Decode(format!("missing field '{field}'")))
}

impl RpcTransport for JsonRpcTransport {
    fn chain_id(&self) -> LedgerResult<u64> {
        parse_u64(&self.request("eth_chainId", json!([]))?)
    }

    fn block_number(&self) -> LedgerResult<u64> {
        parse_u64(&self.request("eth_blockNumber", json!([]))?)
    }

    fn code_at(&self, address: &ChainAddress) -> LedgerResult<Vec<u8>> {
        parse_data(&self.request("eth_getCode", json!([address.to_checksum(), "latest"]))?)
    }

    fn balance(&self, address: &ChainAddress) -> LedgerResult<u128> {
        parse_quantity(&self.request("eth_getBalance", json!([address.to_checksum(), "latest"]))?)
    }

    fn pending_nonce(&self, address: &ChainAddress) -> LedgerResult<u64> {
        parse_u64(&self.request(
            "eth_getTransactionCount",
            json!([address.to_checksum(), "pending"]),
        )?)
    }

    fn estimate_gas(&self, call: &CallRequest) -> LedgerResult<u64> {
        parse_u64(&self.request("eth_estimateGas", json!([Self::call_object(call)]))?)
    }

    fn call(&self, call: &CallRequest) -> LedgerResult<Vec<u8>> {
        parse_data(&self.request("eth_call", json!([Self::call_object(call), "latest"]))?)
    }

    fn send_raw_transaction(&self, raw: &[u8]) -> LedgerResult<String> {
        let result = self.request("eth_sendRawTransaction", json!([to_prefixed_hex(raw)]))?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Decode(format!("expected tx hash, got {result}")))
    }

    fn transaction_receipt(&self, tx_hash: &str) -> LedgerResult<Option<TransactionReceipt>> {
        let result = self.request("eth_getTransactionReceipt", json!([tx_hash]))?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(TransactionReceipt {
            tx_hash: parse_string(&result, "transactionHash")?,
            block_number: parse_u64(&result["blockNumber"])?,
            gas_used: parse_u64(&result["gasUsed"])?,
            succeeded: parse_quantity(&result["status"])? == 1,
            effective_gas_price: result
                .get("effectiveGasPrice")
                .map(parse_quantity)
                .transpose()?,
        }))
    }

    fn transaction(&self, tx_hash: &str) -> LedgerResult<Option<TransactionInfo>> {
        let result = self.request("eth_getTransactionByHash", json!([tx_hash]))?;
        if result.is_null() {
            return Ok(None);
        }
        let block_number = match result.get("blockNumber") {
            Some(Value::Null) | None => None,
            Some(v) => Some(parse_u64(v)?),
        };
        Ok(Some(TransactionInfo {
            tx_hash: parse_string(&result, "hash")?,
            from: parse_string(&result, "from")?,
            to: result.get("to").and_then(Value::as_str).map(str::to_string),
            gas_price: parse_quantity(&result["gasPrice"])?,
            block_number,
        }))
    }

    fn block_timestamp(&self, block_number: u64) -> LedgerResult<Option<u64>> {
        let result = self.request(
            "eth_getBlockByNumber",
            json!([format!("0x{block_number:x}"), false]),
        )?;
        if result.is_null() {
            return Ok(None);
        }
        parse_u64(&result["timestamp"]).map(Some)
    }
}
