use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use croner::Cron;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Cadence;
use super::evaluator::CycleReport;

/// Something that can evaluate every due subscription of one cadence.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, cadence: Cadence) -> Result<CycleReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

/// Wall-clock source for the daily loop.
pub type WallClock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

enum Lifecycle {
    Stopped,
    Running {
        cancel: CancellationToken,
        handles: Vec<JoinHandle<()>>,
    },
    /// Flips to `true` once every loop has exited.
    Stopping { done: watch::Receiver<bool> },
}

/// Drives one periodic loop per cadence.
///
/// Realtime and hourly loops tick on a fixed period after start. The daily
/// loop fires at `daily_hour:00` local time, recomputed after every fire so
/// it follows wall-clock changes.
pub struct CadenceScheduler {
    runner: Arc<dyn CycleRunner>,
    daily: Arc<Cron>,
    daily_hour: u32,
    clock: WallClock,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl CadenceScheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, daily_hour: u32) -> Result<Self> {
        let daily = Cron::new(&format!("0 {daily_hour} * * *"))
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid daily schedule for hour {daily_hour}: {e}"))?;

        Ok(Self {
            runner,
            daily: Arc::new(daily),
            daily_hour,
            clock: Arc::new(Local::now),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Stopped)),
        })
    }

    /// Spawn the three cadence loops. A no-op unless currently stopped.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, Lifecycle::Stopped) {
            tracing::warn!("Scheduler already running, ignoring start");
            return;
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(Cadence::ALL.len());

        for cadence in [Cadence::Realtime, Cadence::Hourly] {
            let runner = self.runner.clone();
            let cancel = cancel.clone();
            let Ok(period) = cadence.min_interval().to_std() else {
                continue;
            };
            handles.push(tokio::spawn(async move {
                interval_loop(runner, cadence, period, cancel).await;
            }));
        }

        let runner = self.runner.clone();
        let daily = self.daily.clone();
        let clock = self.clock.clone();
        let daily_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            daily_loop(runner, daily, clock, daily_cancel).await;
        }));

        tracing::info!(daily_hour = self.daily_hour, "Scheduler started");
        *lifecycle = Lifecycle::Running { cancel, handles };
    }

    /// Cancel every loop and wait for in-flight cycles to finish.
    ///
    /// Concurrent callers all wait for the same shutdown. The loops are
    /// drained on a separate task, so dropping this future does not leave
    /// the scheduler stuck in `Stopping`. A no-op when already stopped.
    pub async fn stop(&self) {
        let mut done = {
            let mut lifecycle = self.lifecycle.lock().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Stopped => {
                    tracing::debug!("Scheduler not running, ignoring stop");
                    return;
                }
                Lifecycle::Stopping { done } => {
                    let waiter = done.clone();
                    *lifecycle = Lifecycle::Stopping { done };
                    waiter
                }
                Lifecycle::Running { cancel, handles } => {
                    let (tx, rx) = watch::channel(false);
                    *lifecycle = Lifecycle::Stopping { done: rx.clone() };
                    cancel.cancel();
                    tokio::spawn(drain(handles, self.lifecycle.clone(), tx));
                    rx
                }
            }
        };

        if done.wait_for(|stopped| *stopped).await.is_err() {
            tracing::error!("Scheduler drain task ended without signalling");
        }
    }

    pub async fn state(&self) -> SchedulerState {
        match *self.lifecycle.lock().await {
            Lifecycle::Stopped => SchedulerState::Stopped,
            Lifecycle::Running { .. } => SchedulerState::Running,
            Lifecycle::Stopping { .. } => SchedulerState::Stopping,
        }
    }

    pub fn daily_hour(&self) -> u32 {
        self.daily_hour
    }

    /// Upcoming daily fire as seen from the local wall clock.
    pub fn next_daily_run(&self) -> Option<DateTime<Local>> {
        next_daily_fire(&self.daily, &(self.clock)())
    }
}

async fn drain(
    handles: Vec<JoinHandle<()>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    done: watch::Sender<bool>,
) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Scheduler loop panicked");
        }
    }

    *lifecycle.lock().await = Lifecycle::Stopped;
    done.send_replace(true);
    tracing::info!("Scheduler stopped");
}

async fn run_once(runner: &dyn CycleRunner, cadence: Cadence) {
    tracing::debug!(cadence = %cadence, "Running cycle");
    if let Err(e) = runner.run_cycle(cadence).await {
        tracing::error!(cadence = %cadence, error = %e, "Cycle failed");
    }
}

async fn interval_loop(
    runner: Arc<dyn CycleRunner>,
    cadence: Cadence,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    // A long cycle pushes the next tick out instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_once(&*runner, cadence).await,
        }
    }

    tracing::debug!(cadence = %cadence, "Cadence loop exited");
}

async fn daily_loop(
    runner: Arc<dyn CycleRunner>,
    cron: Arc<Cron>,
    clock: WallClock,
    cancel: CancellationToken,
) {
    loop {
        let now = clock();
        let next = match next_daily_fire(&cron, &now) {
            Some(next) => next,
            None => {
                tracing::error!("Failed to compute next daily fire, retrying in 60s");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
                continue;
            }
        };

        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next = %next.format("%Y-%m-%d %H:%M:%S %Z"), "Sleeping until daily cycle");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        // Woke early relative to the wall clock; recompute the same target.
        if clock() < next {
            continue;
        }

        run_once(&*runner, Cadence::Daily).await;
    }

    tracing::debug!("Daily loop exited");
}

/// First fire strictly after `after`.
pub fn next_daily_fire<Tz: TimeZone>(cron: &Cron, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    cron.find_next_occurrence(after, false).ok()
}
