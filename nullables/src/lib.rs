//! Nullable infrastructure for deterministic testing.
//!
//! The reconciler only talks to a [`typhoon_store::MirrorStore`] and a
//! [`typhoon_chain::ChainReader`]. This crate provides test-friendly
//! implementations of both that:
//! - Return deterministic values
//! - Can be scripted and inspected programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap the LMDB store and the JSON-RPC reader for these in tests.

pub mod chain;
pub mod store;

pub use chain::ScriptedChain;
pub use store::NullMirrorStore;
