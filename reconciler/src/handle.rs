//! The reconciliation loop's owner: constructed once per process, started
//! and stopped from the control surface.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use typhoon_store::MirrorStore;

use crate::backoff::Backoff;
use crate::scheduler::Scheduler;
use crate::shutdown::{shutdown_requested, ShutdownController};
use crate::status::{ReconcilerStatus, SchedulerState};

struct Runner {
    shutdown: ShutdownController,
    task: JoinHandle<()>,
}

pub struct ReconcilerHandle<S> {
    scheduler: Arc<Scheduler<S>>,
    runner: Mutex<Option<Runner>>,
}

impl<S: MirrorStore + Send + Sync + 'static> ReconcilerHandle<S> {
    pub fn new(scheduler: Scheduler<S>) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            runner: Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<S>> {
        &self.scheduler
    }

    pub fn status(&self) -> ReconcilerStatus {
        self.scheduler.status().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.status().running
    }

    /// Spawn the loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let shutdown = ShutdownController::new();
        let shutdown_rx = shutdown.subscribe();
        let scheduler = Arc::clone(&self.scheduler);
        scheduler.status().update(|s| {
            s.running = true;
            s.state = SchedulerState::Idle;
        });
        let task = tokio::spawn(run_loop(scheduler, shutdown_rx));
        *runner = Some(Runner { shutdown, task });
        tracing::info!("reconciler started");
        true
    }

    /// Signal the loop and wait for it to finish its in-flight cycle.
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(runner) = self.runner.lock().await.take() else {
            return false;
        };
        runner.shutdown.shutdown();
        if let Err(e) = runner.task.await {
            tracing::error!(error = %e, "reconciler task ended abnormally");
        }
        self.scheduler.status().update(|s| {
            s.running = false;
            s.state = SchedulerState::Stopped;
        });
        tracing::info!("reconciler stopped");
        true
    }
}

async fn run_loop<S: MirrorStore + Send + Sync + 'static>(
    scheduler: Arc<Scheduler<S>>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let settings = scheduler.settings().clone();
    let mut backoff = Backoff::new(settings.backoff_initial, settings.backoff_max);
    let mut ticker = interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'outer: loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        // Keep going without waiting for the next tick while behind.
        loop {
            match scheduler.run_cycle().await {
                Ok(report) => {
                    backoff.reset();
                    if report.caught_up || report.range.is_none() {
                        break;
                    }
                    if shutdown_requested(&mut shutdown_rx) {
                        break 'outer;
                    }
                    tracing::debug!(cursor = report.cursor, height = report.chain_height, "catching up");
                }
                Err(_) => {
                    let delay = backoff.next_delay();
                    tracing::info!(delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break 'outer,
                        _ = sleep(delay) => {}
                    }
                    // Retry now rather than waiting out another poll interval.
                    ticker.reset_immediately();
                    break;
                }
            }
        }
    }

    scheduler.status().update(|s| {
        s.running = false;
        s.state = SchedulerState::Stopped;
    });
    tracing::info!("reconciliation loop exited");
}
