//! Refresh job host.
//!
//! Runs a [`RefreshJob`] periodically and on demand, never two at once. A
//! manual run supersedes a periodic one: the periodic run is cancelled, the
//! manual run starts once it has wound down, and the periodic run is queued
//! again after the manual one finishes.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::media::CategoryId;

#[async_trait]
pub trait RefreshJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, category: Option<CategoryId>, cancel: CancellationToken) -> Result<()>;
}

/// Runs jobs back to back; a failing job does not stop the ones after it.
pub struct JobChain {
    jobs: Vec<Arc<dyn RefreshJob>>,
}

impl JobChain {
    pub fn new(jobs: Vec<Arc<dyn RefreshJob>>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl RefreshJob for JobChain {
    fn name(&self) -> &str {
        "library"
    }

    async fn run(&self, category: Option<CategoryId>, cancel: CancellationToken) -> Result<()> {
        for job in &self.jobs {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = job.run(category, cancel.clone()).await {
                tracing::error!(job = job.name(), error = %e, "Refresh job failed");
            }
        }
        Ok(())
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// Conditions a periodic run waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobConstraints {
    pub require_unmetered: bool,
    pub require_charging: bool,
    pub require_battery_not_low: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Unmetered,
    Metered,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConditions {
    pub network: NetworkKind,
    pub charging: bool,
    pub battery_low: bool,
}

impl JobConstraints {
    pub fn satisfied_by(&self, now: &DeviceConditions) -> bool {
        now.network != NetworkKind::Offline
            && (!self.require_unmetered || now.network == NetworkKind::Unmetered)
            && (!self.require_charging || now.charging)
            && (!self.require_battery_not_low || !now.battery_low)
    }
}

pub trait ConditionProbe: Send + Sync {
    fn current(&self) -> DeviceConditions;
}

/// Probe for hosts with no power or network signals: everything is fine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSatisfied;

impl ConditionProbe for AlwaysSatisfied {
    fn current(&self) -> DeviceConditions {
        DeviceConditions {
            network: NetworkKind::Unmetered,
            charging: true,
            battery_low: false,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Periodic,
    Manual,
}

struct ActiveRun {
    id: u64,
    kind: RunKind,
    cancel: CancellationToken,
}

struct Inner {
    job: Arc<dyn RefreshJob>,
    probe: Arc<dyn ConditionProbe>,
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
    requeue_periodic: AtomicBool,
    /// Held for the whole time a job is executing
    run_gate: AsyncMutex<()>,
    idle: Notify,
}

#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(job: Arc<dyn RefreshJob>, probe: Arc<dyn ConditionProbe>) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                probe,
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
                requeue_periodic: AtomicBool::new(false),
                run_gate: AsyncMutex::new(()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Start a manual run, optionally limited to one category.
    ///
    /// Returns `false` if a manual run is already active. An active periodic
    /// run is cancelled; this run waits for it to stop and the periodic run
    /// runs again afterwards.
    pub fn start_now(&self, category: Option<CategoryId>) -> bool {
        let mut active = self.lock_active();
        match active.as_ref() {
            Some(run) if run.kind == RunKind::Manual => {
                tracing::debug!("Manual refresh already running");
                return false;
            }
            Some(run) => {
                tracing::info!("Cancelling periodic refresh for a manual one");
                run.cancel.cancel();
                self.inner.requeue_periodic.store(true, Ordering::SeqCst);
            }
            None => {}
        }
        let (id, cancel) = self.begin(&mut active, RunKind::Manual);
        drop(active);
        self.spawn(id, RunKind::Manual, category, cancel);
        true
    }

    /// Start a periodic run unless one is running or `constraints` fail.
    pub fn trigger_periodic(&self, constraints: JobConstraints) -> bool {
        if !constraints.satisfied_by(&self.inner.probe.current()) {
            tracing::debug!("Periodic refresh skipped: constraints not met");
            return false;
        }
        let mut active = self.lock_active();
        if active.is_some() {
            tracing::debug!("Periodic refresh skipped: already running");
            return false;
        }
        let (id, cancel) = self.begin(&mut active, RunKind::Periodic);
        drop(active);
        self.spawn(id, RunKind::Periodic, None, cancel);
        true
    }

    /// Trigger a periodic run every `every`, starting one period from now.
    pub fn schedule_periodic(&self, every: Duration, constraints: JobConstraints) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.trigger_periodic(constraints);
            }
        })
    }

    /// Cancel the active run and drop any queued periodic run.
    pub fn cancel(&self) {
        self.inner.requeue_periodic.store(false, Ordering::SeqCst);
        if let Some(run) = self.lock_active().as_ref() {
            run.cancel.cancel();
        }
    }

    /// Resolves once no run is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    fn is_active(&self, id: u64) -> bool {
        self.lock_active().as_ref().is_some_and(|run| run.id == id)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, active: &mut Option<ActiveRun>, kind: RunKind) -> (u64, CancellationToken) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            id,
            kind,
            cancel: cancel.clone(),
        });
        (id, cancel)
    }

    fn spawn(&self, id: u64, kind: RunKind, category: Option<CategoryId>, cancel: CancellationToken) {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.execute(id, kind, category, cancel).await });
    }

    async fn execute(
        self,
        mut id: u64,
        mut kind: RunKind,
        mut category: Option<CategoryId>,
        mut cancel: CancellationToken,
    ) {
        // A cancelled run only stops between entries; wait for it to drain
        let gate = self.inner.run_gate.lock().await;
        if !self.is_active(id) {
            tracing::debug!(?kind, "Refresh superseded before it started");
            return;
        }
        loop {
            tracing::info!(job = self.inner.job.name(), ?kind, ?category, "Refresh started");
            if let Err(e) = self.inner.job.run(category, cancel).await {
                tracing::error!(job = self.inner.job.name(), error = %e, "Refresh job failed");
            }

            let next = {
                let mut active = self.lock_active();
                if active.as_ref().is_some_and(|run| run.id == id) {
                    if kind == RunKind::Manual
                        && self.inner.requeue_periodic.swap(false, Ordering::SeqCst)
                    {
                        Some(self.begin(&mut active, RunKind::Periodic))
                    } else {
                        *active = None;
                        None
                    }
                } else {
                    None
                }
            };

            match next {
                Some((next_id, next_cancel)) => {
                    id = next_id;
                    cancel = next_cancel;
                    kind = RunKind::Periodic;
                    category = None;
                }
                None => break,
            }
        }
        drop(gate);

        if !self.is_running() {
            self.inner.idle.notify_waiters();
        }
    }
}
