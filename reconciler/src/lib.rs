//! The Typhoon reconciliation engine.
//!
//! A single [`ReconcilerHandle`] owns the poll loop. Each cycle asks the
//! [`typhoon_chain::ChainReader`] for the next finalized block range, decodes
//! the contract's logs, projects them in emission order through the
//! [`projector::Projector`] (one atomic, idempotent store write per event) and
//! only then advances the durable cursor.

pub mod backoff;
pub mod config;
pub mod decimals;
pub mod error;
pub mod guard;
pub mod handle;
pub mod logging;
pub mod metrics;
pub mod projector;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod spans;
pub mod status;

pub use config::ReconcilerConfig;
pub use decimals::resolve_token_decimals;
pub use error::{ConfigError, ReconcileError, RegistrationError};
pub use handle::ReconcilerHandle;
pub use logging::{init_logging, LogFormat};
pub use metrics::ReconcilerMetrics;
pub use projector::{Effect, Projection, Projector, MAX_REFERRAL_DEPTH};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use shutdown::ShutdownController;
pub use status::{CycleReport, ReconcilerStatus, SchedulerState, StatusCell};
