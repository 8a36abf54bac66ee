//! # Trigger Scheduler
//!
//! One tokio task per scheduled trigger, each on its own interval.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Scheduler tasks                                 │
//! │                                                                         │
//! │  heartbeat      ──tick──run──tick──run──tick──run── ...  (3 s)         │
//! │  backfill 35m   ──tick──run───────────────────────── ...  (30 min)     │
//! │  backfill 7h    ──tick──run───────────────────────── ...  (6 h)        │
//! │  ...                                                                    │
//! │  user_sync      ──tick──run───────────────────────── ...  (10 min)     │
//! │  forced_upload  ──tick──run───────────────────────── ...  (1 min)      │
//! │  retention      ──tick──run───────────────────────── ...  (6 h)        │
//! │                                                                         │
//! │  Every task fires once at startup. A run that outlasts its interval    │
//! │  delays the next tick, so a trigger never overlaps itself. A failed    │
//! │  run is logged and the task carries on.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::ScheduleSettings;
use crate::error::SyncResult;
use crate::orchestrator::{SyncOrchestrator, Trigger, TriggerReport};

/// Something that can execute a trigger.
pub trait TriggerRunner: Send + Sync + 'static {
    fn run_trigger(
        &self,
        trigger: Trigger,
    ) -> impl Future<Output = SyncResult<TriggerReport>> + Send;
}

impl TriggerRunner for SyncOrchestrator {
    fn run_trigger(
        &self,
        trigger: Trigger,
    ) -> impl Future<Output = SyncResult<TriggerReport>> + Send {
        self.run(trigger)
    }
}

/// A trigger and how often it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub trigger: Trigger,
    pub every: Duration,
}

impl ScheduledTrigger {
    pub fn new(trigger: Trigger, every: Duration) -> Self {
        ScheduledTrigger { trigger, every }
    }
}

/// Expands the schedule settings into one entry per task.
pub fn plan(settings: &ScheduleSettings) -> Vec<ScheduledTrigger> {
    let mut plan = vec![ScheduledTrigger::new(
        Trigger::Heartbeat,
        Duration::from_secs(settings.heartbeat_secs),
    )];

    plan.extend(settings.backfills.iter().map(|b| {
        ScheduledTrigger::new(
            Trigger::Backfill {
                lookback: b.lookback(),
            },
            b.every(),
        )
    }));

    plan.extend([
        ScheduledTrigger::new(
            Trigger::UserSync,
            Duration::from_secs(settings.user_sync_secs),
        ),
        ScheduledTrigger::new(
            Trigger::ForcedUpload,
            Duration::from_secs(settings.forced_upload_secs),
        ),
        ScheduledTrigger::new(
            Trigger::RetentionSweep,
            Duration::from_secs(settings.retention_sweep_secs),
        ),
    ]);

    plan
}

/// Running scheduler tasks.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Number of running trigger tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every task and waits for it to finish. A run in progress is
    /// allowed to complete.
    pub async fn shutdown(self) {
        // receivers only go away when their task has already ended
        let _ = self.shutdown.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

/// Spawns one task per entry in `schedule`.
pub fn spawn<R: TriggerRunner>(runner: Arc<R>, schedule: Vec<ScheduledTrigger>) -> SchedulerHandle {
    let (shutdown, _) = watch::channel(false);

    let tasks = schedule
        .into_iter()
        .map(|entry| {
            info!(
                trigger = %entry.trigger,
                every_secs = entry.every.as_secs(),
                "Scheduling trigger"
            );
            tokio::spawn(trigger_loop(
                runner.clone(),
                entry,
                shutdown.subscribe(),
            ))
        })
        .collect();

    SchedulerHandle { shutdown, tasks }
}

async fn trigger_loop<R: TriggerRunner>(
    runner: Arc<R>,
    entry: ScheduledTrigger,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(entry.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        if let Err(e) = runner.run_trigger(entry.trigger).await {
            error!(
                trigger = %entry.trigger,
                error = %e,
                retryable = e.is_retryable(),
                "Trigger failed"
            );
        }
    }

    debug!(trigger = %entry.trigger, "Trigger task stopped");
}
