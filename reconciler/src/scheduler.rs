//! One reconciliation cycle: fetch the next finalized range, decode, project
//! every event in emission order, then advance the cursor.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Instrument;

use typhoon_chain::{ChainError, ChainReader};
use typhoon_events::{decode, EventKind, ObservedEvent, RawLog};
use typhoon_store::MirrorStore;
use typhoon_types::{BlockRange, EventKey, Timestamp};

use crate::guard::RecentlyApplied;
use crate::metrics::ReconcilerMetrics;
use crate::projector::{Effect, Projection, Projector};
use crate::spans::{cycle_span, projection_span};
use crate::status::{CycleReport, SchedulerState, StatusCell};
use crate::{ReconcileError, ReconcilerConfig};

/// Tunables taken from [`ReconcilerConfig`].
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub start_block: u64,
    pub max_block_range: u64,
    pub poll_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub guard_capacity: usize,
    pub max_lag_blocks: u64,
}

impl SchedulerSettings {
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            start_block: config.start_block,
            max_block_range: config.max_block_range.max(1),
            poll_interval: config.poll_interval(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
            guard_capacity: config.guard_capacity,
            max_lag_blocks: config.max_lag_blocks,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

pub struct Scheduler<S> {
    store: Arc<S>,
    chain: Arc<dyn ChainReader>,
    settings: SchedulerSettings,
    projector: Projector,
    guard: Mutex<RecentlyApplied>,
    status: Arc<StatusCell>,
    metrics: Arc<ReconcilerMetrics>,
    /// Serializes cycles; the run loop and manual triggers share it.
    cycle_lock: tokio::sync::Mutex<()>,
}

impl<S: MirrorStore + Send + Sync + 'static> Scheduler<S> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<dyn ChainReader>,
        settings: SchedulerSettings,
        metrics: Arc<ReconcilerMetrics>,
    ) -> Self {
        let guard = Mutex::new(RecentlyApplied::new(settings.guard_capacity));
        Self {
            store,
            chain,
            settings,
            projector: Projector,
            guard,
            status: Arc::new(StatusCell::default()),
            metrics,
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn status(&self) -> &Arc<StatusCell> {
        &self.status
    }

    pub fn metrics(&self) -> &Arc<ReconcilerMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one cycle and record its outcome in the status and metrics.
    ///
    /// A failed cycle leaves the cursor where it was; the caller backs off
    /// and the next cycle retries the same range.
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();
        let result = self.cycle().await;
        self.metrics
            .cycle_duration_ms
            .observe(started.elapsed().as_secs_f64() * 1_000.0);

        match &result {
            Ok(report) => {
                self.metrics.cycles_total.inc();
                let report = report.clone();
                self.status.update(|s| {
                    s.state = SchedulerState::Idle;
                    s.consecutive_failures = 0;
                    s.last_error = None;
                    s.last_processed_block = Some(report.cursor);
                    s.chain_height = Some(report.chain_height);
                    s.lag = Some(report.chain_height.saturating_sub(report.cursor));
                    s.last_cycle = Some(report);
                    s.last_cycle_at = Some(Timestamp::now());
                });
            }
            Err(e) => {
                self.metrics.cycle_failures_total.inc();
                let message = e.to_string();
                self.status.update(|s| {
                    s.state = SchedulerState::Backoff;
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                    s.last_error = Some(message);
                });
                tracing::warn!(error = %e, transient = e.is_transient(), "reconciliation cycle failed");
            }
        }
        result
    }

    async fn cycle(&self) -> Result<CycleReport, ReconcileError> {
        let cursor = self
            .store
            .init_cursor(self.settings.start_block.saturating_sub(1))?;

        self.status.set_state(SchedulerState::Fetching);
        let height = self.chain.current_height().await?;
        self.metrics.observe_progress(cursor, height);

        let Some(range) = BlockRange::following(cursor, height, self.settings.max_block_range)
        else {
            tracing::trace!(cursor, height, "no new finalized blocks");
            return Ok(CycleReport {
                range: None,
                chain_height: height,
                cursor,
                caught_up: true,
                ..CycleReport::default()
            });
        };

        self.reconcile_range(range, height)
            .instrument(cycle_span(&range))
            .await
    }

    async fn reconcile_range(
        &self,
        range: BlockRange,
        height: u64,
    ) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport {
            range: Some(range),
            chain_height: height,
            cursor: range.from - 1,
            ..CycleReport::default()
        };

        let logs = self.fetch_range(range).await?;
        report.logs_fetched = logs.len();

        self.status.set_state(SchedulerState::Decoding);
        let mut events = self.decode_all(&logs, &mut report);
        self.fill_timestamps(&mut events).await?;

        self.status.set_state(SchedulerState::Projecting);
        for event in &events {
            self.project_one(event, &mut report)?;
        }

        self.status.set_state(SchedulerState::Advancing);
        self.store.advance_cursor(range.to)?;
        report.cursor = range.to;
        report.caught_up = range.to >= height;
        self.metrics.observe_progress(range.to, height);

        tracing::info!(
            logs = report.logs_fetched,
            applied = report.applied,
            duplicates = report.duplicates,
            anomalies = report.anomalies,
            decode_errors = report.decode_errors,
            lag = height - range.to,
            "range reconciled"
        );
        Ok(report)
    }

    /// All logs in `range`, splitting it whenever the node refuses the span.
    /// Sorted by emission order with repeated keys removed.
    async fn fetch_range(&self, range: BlockRange) -> Result<Vec<RawLog>, ChainError> {
        let mut pending = vec![range];
        let mut logs = Vec::new();
        while let Some(next) = pending.pop() {
            match self.chain.fetch_logs(next.from, next.to, &EventKind::ALL).await {
                Ok(mut batch) => logs.append(&mut batch),
                Err(e) if e.is_range_limit() => {
                    let Some((lower, upper)) = next.bisect() else {
                        return Err(e);
                    };
                    self.metrics.range_splits_total.inc();
                    tracing::debug!(range = %next, "node refused range, splitting");
                    pending.push(upper);
                    pending.push(lower);
                }
                Err(e) => return Err(e),
            }
        }

        logs.sort_by_key(RawLog::position);
        let mut seen = HashSet::new();
        logs.retain(|log| seen.insert(log.key()));
        Ok(logs)
    }

    fn decode_all(&self, logs: &[RawLog], report: &mut CycleReport) -> Vec<ObservedEvent> {
        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match decode(log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    report.decode_errors += 1;
                    self.metrics.decode_errors_total.inc();
                    tracing::warn!(
                        event = %log.key(),
                        block = log.block_number,
                        error = %e,
                        "skipping undecodable log"
                    );
                }
            }
        }
        events
    }

    /// Fill in block timestamps the node left out of the log objects.
    async fn fill_timestamps(&self, events: &mut [ObservedEvent]) -> Result<(), ChainError> {
        let mut cache: HashMap<u64, Timestamp> = HashMap::new();
        for event in events.iter_mut() {
            if event.meta.block_timestamp.is_some() {
                continue;
            }
            let number = event.meta.block_number;
            let ts = match cache.get(&number) {
                Some(ts) => *ts,
                None => {
                    let ts = Timestamp::new(self.chain.block_timestamp(number).await?);
                    cache.insert(number, ts);
                    ts
                }
            };
            event.meta.block_timestamp = Some(ts);
        }
        Ok(())
    }

    fn project_one(
        &self,
        event: &ObservedEvent,
        report: &mut CycleReport,
    ) -> Result<(), ReconcileError> {
        let key = event.key();
        let kind = event.kind();
        if self.recently_applied(&key) {
            report.duplicates += 1;
            self.metrics.events_duplicate_total.inc();
            return Ok(());
        }

        let projection = projection_span(&key, kind.name())
            .in_scope(|| self.projector.project(self.store.as_ref(), event))?;
        match projection {
            Projection::Applied(effect) => {
                report.applied += 1;
                self.metrics
                    .events_applied_total
                    .with_label_values(&[kind.name()])
                    .inc();
                if let Effect::Anomaly(_) = effect {
                    report.anomalies += 1;
                    self.metrics.anomalies_total.inc();
                }
            }
            Projection::Duplicate => {
                report.duplicates += 1;
                self.metrics.events_duplicate_total.inc();
                tracing::debug!(event = %key, %kind, "already applied");
            }
        }
        self.remember(key);
        Ok(())
    }

    fn recently_applied(&self, key: &EventKey) -> bool {
        match self.guard.lock() {
            Ok(guard) => guard.already_applied(key),
            Err(poisoned) => poisoned.into_inner().already_applied(key),
        }
    }

    fn remember(&self, key: EventKey) {
        match self.guard.lock() {
            Ok(mut guard) => guard.insert(key),
            Err(poisoned) => poisoned.into_inner().insert(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typhoon_events::DomainEvent;
    use typhoon_nullables::{NullMirrorStore, ScriptedChain};
    use typhoon_store::{AccountStore, CursorStore, MirrorStore};
    use typhoon_types::{EvmAddress, TokenAmount};

    fn scheduler(
        store: Arc<NullMirrorStore>,
        chain: Arc<ScriptedChain>,
        start_block: u64,
    ) -> Scheduler<NullMirrorStore> {
        let settings = SchedulerSettings {
            start_block,
            max_block_range: 100,
            ..SchedulerSettings::default()
        };
        Scheduler::new(store, chain, settings, Arc::new(ReconcilerMetrics::new().unwrap()))
    }

    #[tokio::test]
    async fn fresh_mirror_starts_before_start_block() {
        let store = Arc::new(NullMirrorStore::new());
        let chain = Arc::new(ScriptedChain::new(EvmAddress::new([1; 20])));
        chain.set_height(60);
        let s = scheduler(store.clone(), chain.clone(), 50);

        let report = s.run_cycle().await.unwrap();
        assert_eq!(report.range, BlockRange::new(50, 60));
        assert_eq!(store.cursor().unwrap(), Some(60));
        assert_eq!(chain.fetch_calls(), vec![(50, 60)]);
        assert_eq!(s.status().snapshot().state, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn missing_block_timestamp_is_fetched() {
        let store = Arc::new(NullMirrorStore::new());
        let chain = Arc::new(ScriptedChain::new(EvmAddress::new([1; 20])));
        store
            .register_account(&EvmAddress::new([9; 20]), "u", "ref00009", Timestamp::EPOCH)
            .unwrap();
        let key = chain.push_event(
            DomainEvent::ReferralAccrued {
                referrer: EvmAddress::new([9; 20]),
                level: 1,
                amount: TokenAmount::new(3),
            },
            5,
            1,
            0,
        );
        let mut logs = chain.fetch_logs(5, 5, &EventKind::ALL).await.unwrap();
        let chain = Arc::new(ScriptedChain::new(EvmAddress::new([1; 20])));
        let mut log = logs.remove(0);
        log.block_timestamp = None;
        chain.push_log(log);
        chain.set_height(5);

        let s = scheduler(store.clone(), chain, 1);
        s.run_cycle().await.unwrap();
        assert!(store.is_applied(&key).unwrap());
        let audit = store.audit_entries();
        assert_eq!(audit[0].block_timestamp, Timestamp::new(1_700_000_000 + 5 * 12));
    }

    #[tokio::test]
    async fn failure_is_reported_and_cleared() {
        let store = Arc::new(NullMirrorStore::new());
        let chain = Arc::new(ScriptedChain::new(EvmAddress::new([1; 20])));
        chain.set_height(10);
        chain.fail_next_height(ChainError::Connectivity("refused".into()));
        let s = scheduler(store, chain, 1);

        assert!(s.run_cycle().await.is_err());
        let status = s.status().snapshot();
        assert_eq!(status.state, SchedulerState::Backoff);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.unwrap().contains("refused"));

        s.run_cycle().await.unwrap();
        let status = s.status().snapshot();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_error, None);
        assert_eq!(status.lag, Some(0));
    }
}
