//! JSON-RPC 2.0 envelopes and hex helpers for EVM node responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use typhoon_events::RawLog;
use typhoon_types::{parse_quantity, EvmAddress, TxHash};

use crate::ChainError;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Unwrap into the `result` value, mapping a JSON-RPC error object.
    pub fn into_result(self) -> Result<Value, ChainError> {
        if let Some(err) = self.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A log object as serialized by `eth_getLogs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    #[serde(default)]
    block_timestamp: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

fn invalid(what: &str, detail: impl std::fmt::Display) -> ChainError {
    ChainError::InvalidResponse(format!("{what}: {detail}"))
}

pub fn quantity(value: &Value, what: &str) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| invalid(what, format!("expected hex string, got {value}")))?;
    parse_quantity(s).map_err(|e| invalid(what, e))
}

fn optional_quantity(value: Option<&str>, what: &str) -> Result<u64, ChainError> {
    let s = value.ok_or_else(|| invalid(what, "missing (pending log?)"))?;
    parse_quantity(s).map_err(|e| invalid(what, e))
}

pub fn decode_hex(s: &str, what: &str) -> Result<Vec<u8>, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| invalid(what, e))
}

pub fn word(s: &str, what: &str) -> Result<[u8; 32], ChainError> {
    decode_hex(s, what)?
        .try_into()
        .map_err(|v: Vec<u8>| invalid(what, format!("expected 32 bytes, got {}", v.len())))
}

/// Parse the `eth_getLogs` result array.
pub fn parse_logs(result: Value) -> Result<Vec<RawLog>, ChainError> {
    let rpc_logs: Vec<RpcLog> =
        serde_json::from_value(result).map_err(|e| invalid("eth_getLogs result", e))?;
    rpc_logs.into_iter().map(into_raw_log).collect()
}

fn into_raw_log(log: RpcLog) -> Result<RawLog, ChainError> {
    let address = EvmAddress::parse(&log.address).map_err(|e| invalid("log address", e))?;
    let topics = log
        .topics
        .iter()
        .map(|t| word(t, "log topic"))
        .collect::<Result<Vec<_>, _>>()?;
    let tx_hash = log
        .transaction_hash
        .as_deref()
        .ok_or_else(|| invalid("transactionHash", "missing"))
        .and_then(|h| TxHash::parse(h).map_err(|e| invalid("transactionHash", e)))?;
    let block_timestamp = match log.block_timestamp.as_deref() {
        Some(ts) => Some(parse_quantity(ts).map_err(|e| invalid("blockTimestamp", e))?),
        None => None,
    };
    Ok(RawLog {
        address,
        topics,
        data: decode_hex(&log.data, "log data")?,
        block_number: optional_quantity(log.block_number.as_deref(), "blockNumber")?,
        block_timestamp,
        tx_hash,
        log_index: optional_quantity(log.log_index.as_deref(), "logIndex")?,
        removed: log.removed,
    })
}
