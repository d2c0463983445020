//! [`ChainReader`] over Ethereum JSON-RPC.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use typhoon_events::{EventKind, RawLog};
use typhoon_types::{format_quantity, EvmAddress};

use crate::jsonrpc::{decode_hex, parse_logs, quantity};
use crate::transport::{transport_for, RpcTransport};
use crate::{ChainError, ChainReader};

/// Selector of `decimals()`.
const DECIMALS_SELECTOR: &str = "0x313ce567";

#[derive(Clone, Debug)]
pub struct RpcReaderConfig {
    pub rpc_url: String,
    pub http_fallback_url: Option<String>,
    pub contract: EvmAddress,
    pub confirmations: u64,
    pub call_timeout: Duration,
}

pub struct RpcChainReader {
    transport: Box<dyn RpcTransport>,
    contract: EvmAddress,
    confirmations: u64,
    call_timeout: Duration,
    /// Highest raw head reported so far, for regression logging.
    last_head: AtomicU64,
}

impl RpcChainReader {
    pub fn connect(config: &RpcReaderConfig) -> Result<Self, ChainError> {
        let transport = transport_for(
            &config.rpc_url,
            config.http_fallback_url.as_deref(),
            config.call_timeout,
        )?;
        tracing::info!(
            rpc_url = %config.rpc_url,
            transport = transport.name(),
            contract = %config.contract,
            confirmations = config.confirmations,
            "chain reader configured"
        );
        Ok(Self::with_transport(transport, config))
    }

    pub fn with_transport(transport: Box<dyn RpcTransport>, config: &RpcReaderConfig) -> Self {
        Self {
            transport,
            contract: config.contract,
            confirmations: config.confirmations,
            call_timeout: config.call_timeout,
            last_head: AtomicU64::new(0),
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ChainError> {
        bounded(self.call_timeout, method, self.transport.request(method, params)).await
    }

    fn note_head(&self, head: u64) {
        let previous = self.last_head.swap(head, Ordering::Relaxed);
        if head < previous {
            tracing::warn!(
                previous,
                reported = head,
                "node head moved backwards (failover or re-org), using reported height"
            );
        }
    }
}

async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ChainError::Timeout(format!("{what} exceeded {}ms", limit.as_millis())))?
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let head = quantity(&self.call("eth_blockNumber", json!([])).await?, "eth_blockNumber")?;
        self.note_head(head);
        Ok(head.saturating_sub(self.confirmations))
    }

    async fn fetch_logs(
        &self,
        from: u64,
        to: u64,
        kinds: &[EventKind],
    ) -> Result<Vec<RawLog>, ChainError> {
        if from > to || kinds.is_empty() {
            return Ok(Vec::new());
        }
        let topics: Vec<String> = kinds.iter().map(EventKind::topic0_hex).collect();
        let filter = json!({
            "address": self.contract.to_hex(),
            "fromBlock": format_quantity(from),
            "toBlock": format_quantity(to),
            "topics": [topics],
        });
        let result = self
            .call("eth_getLogs", json!([filter]))
            .await
            .map_err(|e| {
                if e.is_range_limit() {
                    ChainError::RangeTooLarge {
                        from,
                        to,
                        message: e.to_string(),
                    }
                } else {
                    e
                }
            })?;

        let logs = parse_logs(result)?;
        let before = logs.len();
        let logs: Vec<RawLog> = logs
            .into_iter()
            .filter(|log| !log.removed && log.address == self.contract)
            .collect();
        if logs.len() != before {
            tracing::debug!(dropped = before - logs.len(), "ignored removed or foreign logs");
        }
        tracing::trace!(from, to, count = logs.len(), "fetched logs");
        Ok(logs)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        let block = self
            .call(
                "eth_getBlockByNumber",
                json!([format_quantity(number), false]),
            )
            .await?;
        let ts = block.get("timestamp").ok_or_else(|| {
            ChainError::InvalidResponse(format!("block {number} not found or has no timestamp"))
        })?;
        quantity(ts, "block timestamp")
    }

    async fn token_decimals(&self, token: &EvmAddress) -> Result<u8, ChainError> {
        let call = json!({ "to": token.to_hex(), "data": DECIMALS_SELECTOR });
        let result = self.call("eth_call", json!([call, "latest"])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("eth_call result is not a string".into()))?;
        let bytes = decode_hex(raw, "decimals() result")?;
        if bytes.len() != 32 || bytes[..31].iter().any(|b| *b != 0) {
            return Err(ChainError::InvalidResponse(format!(
                "token {token} returned a non-uint8 decimals() value"
            )));
        }
        Ok(bytes[31])
    }
}
