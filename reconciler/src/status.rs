//! Observable scheduler state.

use serde::Serialize;
use std::fmt;
use std::sync::RwLock;

use typhoon_types::{BlockRange, Timestamp};

/// Where the scheduler is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Fetching,
    Decoding,
    Projecting,
    Advancing,
    Backoff,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Decoding => "decoding",
            SchedulerState::Projecting => "projecting",
            SchedulerState::Advancing => "advancing",
            SchedulerState::Backoff => "backoff",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of one successful cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Range processed, `None` when there was nothing new.
    pub range: Option<BlockRange>,
    pub chain_height: u64,
    /// Cursor after the cycle.
    pub cursor: u64,
    pub logs_fetched: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub anomalies: usize,
    pub decode_errors: usize,
    /// Whether the cursor reached the chain height.
    pub caught_up: bool,
}

/// Snapshot served by `/status` and used by `/health`.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcilerStatus {
    pub state: SchedulerState,
    pub running: bool,
    pub last_processed_block: Option<u64>,
    pub chain_height: Option<u64>,
    pub lag: Option<u64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_cycle: Option<CycleReport>,
    pub last_cycle_at: Option<Timestamp>,
}

impl ReconcilerStatus {
    /// Running, and no further behind the chain than `max_lag` blocks.
    pub fn is_healthy(&self, max_lag: u64) -> bool {
        self.running && self.lag.is_some_and(|lag| lag <= max_lag)
    }
}

impl Default for ReconcilerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Stopped,
            running: false,
            last_processed_block: None,
            chain_height: None,
            lag: None,
            consecutive_failures: 0,
            last_error: None,
            last_cycle: None,
            last_cycle_at: None,
        }
    }
}

/// Shared, lock-protected status.
#[derive(Default)]
pub struct StatusCell {
    inner: RwLock<ReconcilerStatus>,
}

impl StatusCell {
    pub fn snapshot(&self) -> ReconcilerStatus {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut ReconcilerStatus)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn set_state(&self, state: SchedulerState) {
        self.update(|s| s.state = state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_requires_running_and_bounded_lag() {
        let mut status = ReconcilerStatus::default();
        assert!(!status.is_healthy(10));
        status.running = true;
        assert!(!status.is_healthy(10));
        status.lag = Some(10);
        assert!(status.is_healthy(10));
        status.lag = Some(11);
        assert!(!status.is_healthy(10));
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_value(SchedulerState::Backoff).unwrap();
        assert_eq!(json, "backoff");
    }
}
