//! JSON-RPC transports.
//!
//! [`HttpTransport`] posts one request per call. [`WsTransport`] keeps a single
//! socket open and reconnects lazily after a failure. [`FailoverTransport`]
//! prefers the socket and retries over HTTP when the socket is unusable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::ChainError;

/// Default connection timeout for both transports.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a failed socket is left alone before a reconnect is attempted.
const RECONNECT_COOLDOWN: Duration = Duration::from_secs(30);

/// Sends a JSON-RPC call and returns its `result`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

pub struct HttpTransport {
    url: String,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ChainError::Connectivity(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http_client,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http_client
            .post(&self.url)
            .json(&JsonRpcRequest::new(id, method, params))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<JsonRpcResponse>(&body) {
            Ok(rpc) => rpc.into_result(),
            // Rate limiting and gateway errors carry no JSON-RPC body.
            Err(_) if !status.is_success() => Err(ChainError::Connectivity(format!(
                "HTTP status {status} from {method}"
            ))),
            Err(e) => Err(ChainError::InvalidResponse(format!(
                "{method} returned non JSON-RPC body: {e}"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct WsState {
    socket: Option<WsStream>,
    failed_at: Option<Instant>,
}

pub struct WsTransport {
    url: String,
    state: Mutex<WsState>,
    next_id: AtomicU64,
    /// Deadline for connecting plus one request/response exchange.
    response_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, response_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(WsState::default()),
            next_id: AtomicU64::new(1),
            response_timeout,
        }
    }

    /// `true` while a recent failure keeps the socket in cooldown.
    pub async fn is_cooling_down(&self) -> bool {
        let state = self.state.lock().await;
        state.socket.is_none()
            && state
                .failed_at
                .is_some_and(|at| at.elapsed() < RECONNECT_COOLDOWN)
    }

    async fn connect(&self, deadline: tokio::time::Instant) -> Result<WsStream, ChainError> {
        let deadline = deadline.min(tokio::time::Instant::now() + DEFAULT_CONNECT_TIMEOUT);
        let (socket, _response) = tokio::time::timeout_at(deadline, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ChainError::Timeout(format!("websocket connect to {}", self.url)))?
            .map_err(|e| ChainError::Connectivity(format!("websocket connect failed: {e}")))?;
        tracing::info!(url = %self.url, "websocket connected");
        Ok(socket)
    }
}

/// Send one request on `socket` and wait for the response with the same id.
///
/// Subscription notifications and responses to abandoned calls are skipped.
async fn exchange(socket: &mut WsStream, id: u64, body: String) -> Result<JsonRpcResponse, ChainError> {
    socket
        .send(Message::Text(body))
        .await
        .map_err(|e| ChainError::Connectivity(format!("websocket send failed: {e}")))?;

    while let Some(frame) = socket.next().await {
        let frame =
            frame.map_err(|e| ChainError::Connectivity(format!("websocket read failed: {e}")))?;
        match frame {
            Message::Text(text) => match serde_json::from_str::<JsonRpcResponse>(&text) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping non JSON-RPC websocket frame");
                }
            },
            Message::Ping(payload) => {
                socket
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|e| ChainError::Connectivity(format!("websocket pong failed: {e}")))?;
            }
            Message::Close(_) => {
                return Err(ChainError::Connectivity("websocket closed by node".into()));
            }
            _ => {}
        }
    }
    Err(ChainError::Connectivity("websocket stream ended".into()))
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let deadline = tokio::time::Instant::now() + self.response_timeout;
        let mut state = self.state.lock().await;
        let mut socket = match state.socket.take() {
            Some(socket) => socket,
            None => match self.connect(deadline).await {
                Ok(socket) => socket,
                Err(e) => {
                    state.failed_at = Some(Instant::now());
                    return Err(e);
                }
            },
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| ChainError::InvalidResponse(format!("failed to encode request: {e}")))?;

        let exchanged = tokio::time::timeout_at(deadline, exchange(&mut socket, id, body))
            .await
            .unwrap_or_else(|_| {
                Err(ChainError::Timeout(format!(
                    "websocket {method} unanswered after {}ms",
                    self.response_timeout.as_millis()
                )))
            });
        match exchanged {
            Ok(response) => {
                state.socket = Some(socket);
                state.failed_at = None;
                response.into_result()
            }
            Err(e) => {
                // The socket is dropped here; the next call reconnects.
                state.failed_at = Some(Instant::now());
                tracing::warn!(url = %self.url, error = %e, "websocket call failed, dropping socket");
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// WebSocket first, HTTP when the socket fails below the JSON-RPC layer.
///
/// The socket's own deadline must be shorter than the caller's so that an
/// unanswered call still leaves time for the HTTP retry.
pub struct FailoverTransport {
    primary: WsTransport,
    fallback: HttpTransport,
}

impl FailoverTransport {
    pub fn new(primary: WsTransport, fallback: HttpTransport) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl RpcTransport for FailoverTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        if self.primary.is_cooling_down().await {
            return self.fallback.request(method, params).await;
        }
        match self.primary.request(method, params.clone()).await {
            Err(e) if e.is_transport_failure() => {
                tracing::debug!(method, error = %e, "retrying over HTTP fallback");
                self.fallback.request(method, params).await
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "websocket+http"
    }
}

/// Build the transport for `rpc_url`.
///
/// `ws://`/`wss://` URLs get a [`FailoverTransport`]; the fallback URL is
/// `http_fallback_url` when given, otherwise the same endpoint over HTTP.
pub fn transport_for(
    rpc_url: &str,
    http_fallback_url: Option<&str>,
    timeout: Duration,
) -> Result<Box<dyn RpcTransport>, ChainError> {
    if let Some(rest) = rpc_url.strip_prefix("ws://") {
        let fallback = http_fallback_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("http://{rest}"));
        return Ok(Box::new(FailoverTransport::new(
            WsTransport::new(rpc_url, timeout / 2),
            HttpTransport::new(fallback, timeout / 2)?,
        )));
    }
    if let Some(rest) = rpc_url.strip_prefix("wss://") {
        let fallback = http_fallback_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://{rest}"));
        return Ok(Box::new(FailoverTransport::new(
            WsTransport::new(rpc_url, timeout / 2),
            HttpTransport::new(fallback, timeout / 2)?,
        )));
    }
    Ok(Box::new(HttpTransport::new(rpc_url, timeout)?))
}
