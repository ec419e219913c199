use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use kiln_settings::Settings;
use kiln_store::{JobStatus, JobStore};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{error::Result, runner::JobRunner, types::TickOutcome};

/// Promotes the oldest waiting job once nothing else is running.
///
/// Holds no job or queue state between ticks; the store is the only source
/// of truth. Ticks never overlap: [`tick`](Self::tick) returns
/// [`TickOutcome::Skipped`] without touching anything while another tick is
/// in flight.
pub struct QueueWorker {
    store: Arc<dyn JobStore>,
    settings: Arc<Settings>,
    runner: Arc<dyn JobRunner>,
    in_flight: AtomicBool,
    idle: Notify,
}

impl QueueWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        settings: Arc<Settings>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            store,
            settings,
            runner,
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    /// True while a tick is executing.
    pub fn is_ticking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no tick is executing, whoever started it.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a tick ending in between still wakes us.
            notified.as_mut().enable();
            if !self.is_ticking() {
                return;
            }
            notified.await;
        }
    }

    /// Run one decision cycle. Never fails: errors are logged and reported
    /// as [`TickOutcome::Failed`].
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &self.idle) else {
            debug!("previous tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        match self.run_tick().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("queue worker tick error: {e}");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_tick(&self) -> Result<TickOutcome> {
        if !self.settings.job_queueing()? {
            return Ok(TickOutcome::QueueingDisabled);
        }

        // Single job at a time, regardless of queue depth.
        let running = self.store.find_running_jobs()?;
        if !running.is_empty() {
            return Ok(TickOutcome::JobRunning {
                running: running.len(),
            });
        }

        let Some(entry) = self.store.find_oldest_waiting_queue_entry()? else {
            return Ok(TickOutcome::QueueEmpty);
        };

        let Some(job) = self.store.find_job(&entry.job_id)? else {
            self.store.delete_queue_entry(&entry.id)?;
            info!(queue_id = %entry.id, job_id = %entry.job_id, "removed orphaned queue entry");
            return Ok(TickOutcome::OrphanRemoved {
                queue_id: entry.id,
                job_id: entry.job_id,
            });
        };

        if !job.status.is_startable() {
            self.store.delete_queue_entry(&entry.id)?;
            info!(
                queue_id = %entry.id,
                job_id = %job.id,
                status = %job.status,
                "removed stale queue entry"
            );
            return Ok(TickOutcome::StaleRemoved {
                queue_id: entry.id,
                job_id: job.id,
                status: job.status,
            });
        }

        // Dequeue before starting so a failing runner cannot pin the head.
        self.store.delete_queue_entry(&entry.id)?;

        info!(job_id = %job.id, name = %job.name, "starting queued job");
        match self.runner.start(&job.id).await {
            Ok(()) => Ok(TickOutcome::Started { job_id: job.id }),
            Err(e) => {
                error!(job_id = %job.id, "failed to start queued job: {e}");
                let info = e.diagnostic();
                if !self
                    .store
                    .update_job_status(&job.id, JobStatus::Error, &info)?
                {
                    warn!(job_id = %job.id, "job vanished before its failure could be recorded");
                }
                Ok(TickOutcome::StartFailed {
                    job_id: job.id,
                    info,
                })
            }
        }
    }

    /// Start the recurring timer. The first tick fires immediately.
    ///
    /// Firings missed while a tick runs are dropped, not replayed.
    pub fn spawn(self: Arc<Self>, period: Duration) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = Arc::clone(&self);

        let task = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "queue worker started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("queue worker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let outcome = worker.tick().await;
                        if outcome.consumed_entry() {
                            info!(?outcome, "queue worker tick");
                        } else {
                            debug!(?outcome, "queue worker tick");
                        }
                    }
                }
            }
        });

        WorkerHandle {
            worker: self,
            cancel,
            task,
        }
    }
}

/// Owner of a running [`QueueWorker`] timer.
pub struct WorkerHandle {
    worker: Arc<QueueWorker>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Run one tick now and wait for it. Honors the in-flight guard, so this
    /// returns `Skipped` if the timer's tick is currently running.
    pub async fn trigger(&self) -> TickOutcome {
        self.worker.tick().await
    }

    pub fn worker(&self) -> &Arc<QueueWorker> {
        &self.worker
    }

    /// Cancel the timer and wait for any in-flight tick to finish, including
    /// ticks started through [`worker`](Self::worker) or [`trigger`](Self::trigger).
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("queue worker task ended abnormally: {e}");
        }
        self.worker.wait_idle().await;
    }
}

/// Clears the in-flight flag on drop, including on early return, and wakes
/// anyone waiting for the worker to go idle.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, idle })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}
