//! Scripted chain: a [`ChainReader`] whose height, logs and failures are set
//! by the test.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use typhoon_chain::{ChainError, ChainReader};
use typhoon_events::{DomainEvent, EventKind, EventMeta, RawLog};
use typhoon_types::{EventKey, EvmAddress, Timestamp, TxHash};

struct ChainState {
    height: u64,
    /// Logs in the order `fetch_logs` returns them (not necessarily sorted).
    logs: Vec<RawLog>,
    height_failures: VecDeque<ChainError>,
    fetch_failures: VecDeque<ChainError>,
    /// Widest range served before answering `RangeTooLarge`.
    max_range: Option<u64>,
    fetch_calls: Vec<(u64, u64)>,
    height_calls: u64,
    decimals: HashMap<EvmAddress, u8>,
}

pub struct ScriptedChain {
    contract: EvmAddress,
    state: Mutex<ChainState>,
    /// `true` while `fetch_logs` calls are held.
    held: watch::Sender<bool>,
}

impl ScriptedChain {
    pub fn new(contract: EvmAddress) -> Self {
        Self {
            contract,
            state: Mutex::new(ChainState {
                height: 0,
                logs: Vec::new(),
                height_failures: VecDeque::new(),
                fetch_failures: VecDeque::new(),
                max_range: None,
                fetch_calls: Vec::new(),
                height_calls: 0,
                decimals: HashMap::new(),
            }),
            held: watch::Sender::new(false),
        }
    }

    pub fn contract(&self) -> EvmAddress {
        self.contract
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Append a raw log as-is.
    pub fn push_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Encode `event` as the contract would and append it.
    ///
    /// The transaction hash is derived from `tx` so tests can refer to it.
    pub fn push_event(&self, event: DomainEvent, block_number: u64, tx: u8, log_index: u64) -> EventKey {
        let meta = EventMeta {
            key: EventKey::new(TxHash::new([tx; 32]), log_index),
            block_number,
            block_timestamp: Some(Timestamp::new(1_700_000_000 + block_number * 12)),
        };
        self.push_log(event.to_raw_log(self.contract, &meta));
        meta.key
    }

    /// Fail the next `current_height` call with `error`.
    pub fn fail_next_height(&self, error: ChainError) {
        self.state.lock().unwrap().height_failures.push_back(error);
    }

    /// Fail the next `fetch_logs` call with `error`.
    pub fn fail_next_fetch(&self, error: ChainError) {
        self.state.lock().unwrap().fetch_failures.push_back(error);
    }

    pub fn set_max_range(&self, blocks: u64) {
        self.state.lock().unwrap().max_range = Some(blocks);
    }

    pub fn set_decimals(&self, token: EvmAddress, decimals: u8) {
        self.state.lock().unwrap().decimals.insert(token, decimals);
    }

    /// Make `fetch_logs` wait, after recording the call, until
    /// [`ScriptedChain::release_fetches`].
    pub fn hold_fetches(&self) {
        self.held.send_replace(true);
    }

    pub fn release_fetches(&self) {
        self.held.send_replace(false);
    }

    /// Every `(from, to)` passed to `fetch_logs`, in call order.
    pub fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    pub fn height_calls(&self) -> u64 {
        self.state.lock().unwrap().height_calls
    }
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.height_calls += 1;
        match state.height_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state.height),
        }
    }

    async fn fetch_logs(
        &self,
        from: u64,
        to: u64,
        kinds: &[EventKind],
    ) -> Result<Vec<RawLog>, ChainError> {
        if from > to {
            return Ok(Vec::new());
        }
        self.state.lock().unwrap().fetch_calls.push((from, to));
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fetch_failures.pop_front() {
            return Err(error);
        }
        if let Some(max) = state.max_range {
            if to - from + 1 > max {
                return Err(ChainError::RangeTooLarge {
                    from,
                    to,
                    message: format!("range exceeds {max} blocks"),
                });
            }
        }
        let topics: Vec<[u8; 32]> = kinds.iter().map(EventKind::topic0).collect();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.block_number >= from && log.block_number <= to)
            .filter(|log| log.topics.first().is_some_and(|t| topics.contains(t)))
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, ChainError> {
        Ok(1_700_000_000 + number * 12)
    }

    async fn token_decimals(&self, token: &EvmAddress) -> Result<u8, ChainError> {
        self.state
            .lock()
            .unwrap()
            .decimals
            .get(token)
            .copied()
            .ok_or_else(|| ChainError::InvalidResponse(format!("{token} has no decimals()")))
    }
}
