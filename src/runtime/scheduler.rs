//! Periodic job scheduler
//!
//! Jobs become due by clock time. A job still running when its next tick
//! arrives is skipped for that tick rather than run twice.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::clock::SharedClock;
use crate::error::Result;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// Previous run still in flight
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub every_secs: i64,
    pub next_due: DateTime<Utc>,
    pub runs: u64,
    pub failures: u64,
    pub running: bool,
}

/// Clears the running flag however the run ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScheduledJob {
    job: Arc<dyn Job>,
    every: Duration,
    next_due: Mutex<DateTime<Utc>>,
    running: AtomicBool,
    runs: AtomicU64,
    failures: AtomicU64,
}

impl ScheduledJob {
    /// First run is due at `start`
    pub fn new(job: Arc<dyn Job>, every: Duration, start: DateTime<Utc>) -> Self {
        Self {
            job,
            every,
            next_due: Mutex::new(start),
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    fn next_due(&self) -> DateTime<Utc> {
        *self.next_due.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_due()
    }

    pub async fn try_run(&self, now: DateTime<Utc>) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = self.name(), "Previous run still in flight, skipping");
            return RunOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);
        *self.next_due.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now + self.every;

        self.runs.fetch_add(1, Ordering::Relaxed);
        match self.job.run().await {
            Ok(()) => RunOutcome::Completed,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(job = self.name(), "Job failed: {}", e);
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name().to_string(),
            every_secs: self.every.num_seconds(),
            next_due: self.next_due(),
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Acquire),
        }
    }
}

pub struct Scheduler {
    clock: SharedClock,
    jobs: Vec<Arc<ScheduledJob>>,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(clock: SharedClock) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self { clock, jobs: Vec::new(), shutdown }
    }

    /// Register a job, due immediately and then every `every`
    pub fn add(&mut self, job: Arc<dyn Job>, every: Duration) {
        let start = self.clock.now();
        self.jobs.push(Arc::new(ScheduledJob::new(job, every, start)));
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(|j| j.status()).collect()
    }

    /// Run every due job once, concurrently, and wait for all of them
    pub async fn run_due(&self) -> Vec<(String, RunOutcome)> {
        let now = self.clock.now();
        let due: Vec<&Arc<ScheduledJob>> = self.jobs.iter().filter(|j| j.is_due(now)).collect();
        let outcomes = join_all(due.iter().map(|job| job.try_run(now))).await;
        due.iter().map(|j| j.name().to_string()).zip(outcomes).collect()
    }

    /// Spawn the tick loop; each due job runs on its own task
    ///
    /// Stops on [`stop`](Self::stop). Runs still in flight are aborted.
    pub fn start(self: &Arc<Self>, tick: std::time::Duration) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(jobs = self.jobs.len(), tick_ms = tick.as_millis() as u64, "Starting scheduler");

        tokio::spawn(async move {
            let mut ticker = interval(tick);
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        while in_flight.try_join_next().is_some() {}

                        let now = scheduler.clock.now();
                        for job in scheduler.jobs.iter().filter(|j| j.is_due(now)) {
                            let job = Arc::clone(job);
                            in_flight.spawn(async move { job.try_run(now).await });
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(in_flight = in_flight.len(), "Scheduler shutting down");
                        in_flight.abort_all();
                        break;
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}
