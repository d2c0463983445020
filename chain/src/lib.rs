//! Chain access for the Typhoon mirror.
//!
//! [`ChainReader`] is the only surface the reconciler sees. The JSON-RPC
//! implementation talks to an EVM node over WebSocket with an HTTP fallback,
//! or over plain HTTP, and bounds every call with a timeout.

pub mod error;
pub mod jsonrpc;
pub mod reader;
pub mod rpc_reader;
pub mod transport;

pub use error::ChainError;
pub use reader::ChainReader;
pub use rpc_reader::{RpcChainReader, RpcReaderConfig};
pub use transport::{FailoverTransport, HttpTransport, RpcTransport, WsTransport};
