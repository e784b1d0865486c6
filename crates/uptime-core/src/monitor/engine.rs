use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::monitor::state::{MonitorState, TargetSnapshot, TargetStatus, Transition};
use crate::probe::{Outcome, Prober};
use crate::registry::{TargetRegistry, TrackedTarget};
use crate::webhook::{Alert, DispatchSummary, Notifier};

/// Result of one probe cycle for one target.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub name: String,
    pub outcome: Outcome,
    pub transition: Transition,
    pub alert: Option<Alert>,
    pub dispatch: DispatchSummary,
}

struct RunHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic scheduler fanning out one probe cycle per target on every tick.
///
/// A target's status lock is held for its entire cycle (probe, state update,
/// notification), so cycles of the same target never overlap.
pub struct Monitor {
    registry: TargetRegistry,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    shutdown_grace: Duration,
    state: Arc<RwLock<MonitorState>>,
    run: Mutex<Option<RunHandle>>,
}

impl Monitor {
    pub fn new(
        registry: TargetRegistry,
        interval: Duration,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            prober,
            notifier,
            interval,
            shutdown_grace: Duration::from_secs(5),
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            run: Mutex::new(None),
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    /// Snapshot every target's state.
    ///
    /// Each target's lock is held for its whole cycle, so this waits for any
    /// in-flight cycle to finish: up to the probe timeout plus the webhook
    /// timeout per busy target.
    pub async fn statuses(&self) -> Vec<TargetSnapshot> {
        let mut out = Vec::with_capacity(self.registry.len());
        for entry in self.registry.entries() {
            out.push(entry.snapshot().await);
        }
        out
    }

    /// Start the tick loop in a background task. No-op if already running
    /// or still stopping.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return;
        }
        if !set_state(&self.state, MonitorState::Active).await {
            return;
        }

        info!(
            targets = self.registry.len(),
            interval_secs = self.interval.as_secs_f64(),
            "Starting monitor"
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.registry.clone(),
            Arc::clone(&self.prober),
            Arc::clone(&self.notifier),
            self.interval,
            self.shutdown_grace,
            shutdown.clone(),
        ));
        *run = Some(RunHandle { shutdown, task });
    }

    /// Stop ticking and wait for in-flight cycles, up to the shutdown grace.
    pub async fn stop(&self) {
        let Some(handle) = self.run.lock().await.take() else {
            return;
        };
        set_state(&self.state, MonitorState::Stopping).await;
        info!("Stopping monitor");

        handle.shutdown.cancel();
        if let Err(e) = handle.task.await {
            error!(error = %e, "Monitor loop terminated abnormally");
        }

        set_state(&self.state, MonitorState::Stopped).await;
        info!("Monitor stopped");
    }

    /// Run one cycle for every target concurrently and wait for all of them.
    ///
    /// Unlike scheduled ticks, a target whose cycle is still in flight is
    /// waited for rather than skipped.
    pub async fn poll_once(&self) -> Vec<CycleReport> {
        let cycles = self.registry.entries().iter().map(|entry| {
            let entry = Arc::clone(entry);
            let prober = Arc::clone(&self.prober);
            let notifier = Arc::clone(&self.notifier);
            async move {
                let status = Arc::clone(&entry.status).lock_owned().await;
                run_cycle(entry, status, prober, notifier).await
            }
        });
        join_all(cycles).await
    }
}

async fn set_state(state: &RwLock<MonitorState>, next: MonitorState) -> bool {
    let mut current = state.write().await;
    let from = *current;
    if !from.can_transition_to(next) {
        warn!(%from, to = %next, "Refusing monitor state transition");
        return false;
    }
    *current = next;
    true
}

/// Matches the horizon tokio itself uses for "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

async fn run_loop(
    registry: TargetRegistry,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    grace: Duration,
    shutdown: CancellationToken,
) {
    let now = Instant::now();
    let first = now
        .checked_add(interval)
        .unwrap_or_else(|| now + FAR_FUTURE);
    let mut ticker = tokio::time::interval_at(first, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        while let Some(res) = in_flight.try_join_next() {
            log_join_result(res);
        }

        debug!(targets = registry.len(), in_flight = in_flight.len(), "Tick");

        for entry in registry.entries() {
            // A held lock means last tick's cycle for this target is still running.
            let status = match Arc::clone(&entry.status).try_lock_owned() {
                Ok(status) => status,
                Err(_) => {
                    warn!(name = %entry.target.name, "Previous cycle still in flight, skipping tick");
                    continue;
                }
            };
            in_flight.spawn(run_cycle(
                Arc::clone(entry),
                status,
                Arc::clone(&prober),
                Arc::clone(&notifier),
            ));
        }
    }

    drain(in_flight, grace).await;
}

async fn drain(mut in_flight: JoinSet<CycleReport>, grace: Duration) {
    if in_flight.is_empty() {
        return;
    }
    debug!(in_flight = in_flight.len(), "Waiting for in-flight cycles");

    let waited = tokio::time::timeout(grace, async {
        while let Some(res) = in_flight.join_next().await {
            log_join_result(res);
        }
    })
    .await;

    if waited.is_err() {
        warn!(
            in_flight = in_flight.len(),
            "Shutdown grace elapsed, detaching remaining cycles"
        );
        in_flight.detach_all();
    }
}

fn log_join_result(res: Result<CycleReport, tokio::task::JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "Probe cycle task failed");
    }
}

/// Probe, record, notify: strictly in that order, under the target's lock.
async fn run_cycle(
    entry: Arc<TrackedTarget>,
    mut status: OwnedMutexGuard<TargetStatus>,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
) -> CycleReport {
    let target = &entry.target;

    let outcome = prober.probe(target).await;
    match outcome.failure_reason() {
        None => info!(name = %target.name, "{}: {}", Utc::now().to_rfc3339(), outcome.summary(&target.name)),
        Some(reason) => info!(
            name = %target.name,
            reason,
            "{}: {}",
            Utc::now().to_rfc3339(),
            outcome.summary(&target.name)
        ),
    }

    let transition = status.apply(&outcome);

    let alert = Alert::from_transition(target, transition, &outcome);
    let mut dispatch = DispatchSummary::default();
    if let Some(ref alert) = alert {
        match transition {
            Transition::WentDown => warn!(
                name = %target.name,
                url = %target.url,
                status_code = alert.status_code,
                alert_id = %alert.id,
                "Target went down"
            ),
            _ => info!(
                name = %target.name,
                url = %target.url,
                status_code = alert.status_code,
                alert_id = %alert.id,
                "Target came back up"
            ),
        }
        dispatch = notifier.notify(target, alert).await;
    }

    drop(status);

    CycleReport {
        name: target.name.clone(),
        outcome,
        transition,
        alert,
        dispatch,
    }
}
