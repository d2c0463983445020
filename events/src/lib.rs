//! Typhoon contract events.
//!
//! The contract emits seven events. This crate knows their ABI layout, turns
//! raw logs into the closed [`DomainEvent`] enum and, for tests and scripted
//! chains, can encode a domain event back into a raw log.

pub mod abi;
pub mod decode;
pub mod error;
pub mod event;
pub mod log;

pub use abi::EventKind;
pub use decode::decode;
pub use error::DecodeError;
pub use event::{DomainEvent, EventMeta, ObservedEvent};
pub use log::RawLog;
