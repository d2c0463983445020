//! HTTP surface of the Typhoon mirror.
//!
//! Provides endpoints for:
//! - Starting and stopping the reconciliation loop
//! - Status, health and Prometheus metrics
//! - Account registration
//! - Mirror reads: accounts, direct referrals, purchase history, audit log

pub mod error;
pub mod handlers;
pub mod pagination;
pub mod server;

pub use error::RpcError;
pub use server::{router, ApiServer, ApiState};
