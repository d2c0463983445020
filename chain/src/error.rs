use thiserror::Error;

/// Errors returned by chain reads.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("node unreachable: {0}")]
    Connectivity(String),

    #[error("chain call timed out: {0}")]
    Timeout(String),

    #[error("node refused log range {from}..={to}: {message}")]
    RangeTooLarge { from: u64, to: u64, message: String },

    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

/// JSON-RPC error code several providers use for "query returned more than N results".
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;

impl ChainError {
    /// Whether retrying the same call later can succeed.
    ///
    /// A malformed response is not expected to fix itself; everything else is
    /// a property of the node or the network at that moment.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::InvalidResponse(_))
    }

    /// Whether the failure happened below JSON-RPC (socket, HTTP, timeout),
    /// so another transport may succeed where this one did not.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ChainError::Connectivity(_) | ChainError::Timeout(_))
    }

    /// Whether a node error means the `eth_getLogs` range was too wide.
    pub fn is_range_limit(&self) -> bool {
        match self {
            ChainError::RangeTooLarge { .. } => true,
            ChainError::Rpc { code, message } => {
                let lower = message.to_lowercase();
                *code == LIMIT_EXCEEDED_CODE || lower.contains("range") || lower.contains("limit")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainError::Timeout(format!("request timed out: {e}"))
        } else if e.is_connect() {
            ChainError::Connectivity(format!("connection failed: {e}"))
        } else if e.is_decode() {
            ChainError::InvalidResponse(format!("failed to parse response: {e}"))
        } else {
            ChainError::Connectivity(e.to_string())
        }
    }
}
