//! Process-wide service that runs one deferred finalization per closed session.
//!
//! Jobs are fire-and-forget and at-most-once: no retry, no timeout, and a job
//! that fails is logged and dropped. Pending jobs live only in memory, so a
//! restart before the delay elapses loses them.
//!
//! Lifecycle: [`FinalizationScheduler::start`] at init binds the service to
//! the current runtime; [`FinalizationScheduler::drain`] at shutdown stops
//! intake, abandons jobs still waiting out their delay and waits for the ones
//! already running.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::Finalizer;
use crate::model::session::Session;

pub struct FinalizationScheduler {
    finalizer: Arc<Finalizer>,
    delay: std::time::Duration,
    workers: Arc<Semaphore>,
    jobs: Mutex<JoinSet<()>>,
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    accepting: AtomicBool,
}

impl FinalizationScheduler {
    /// Must be called from within a tokio runtime; jobs run on that runtime.
    pub fn start(finalizer: Arc<Finalizer>, delay: chrono::Duration, workers: usize) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let delay = delay.to_std().unwrap_or_default();

        info!(
            delay_secs = delay.as_secs(),
            workers, "Finalization scheduler started"
        );

        Arc::new(Self {
            finalizer,
            delay,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            jobs: Mutex::new(JoinSet::new()),
            runtime: Handle::current(),
            shutdown,
            accepting: AtomicBool::new(true),
        })
    }

    /// Queues the finalization of a closed session. Returns the job id, or
    /// `None` when the scheduler is draining and the job was not accepted.
    pub fn schedule(&self, session: Session) -> Option<Uuid> {
        if !self.accepting.load(Ordering::Acquire) {
            warn!(session_id = session.id, "Scheduler draining, finalization not queued");
            return None;
        }

        let job_id = Uuid::new_v4();
        let finalizer = self.finalizer.clone();
        let workers = self.workers.clone();
        let delay = self.delay;
        let mut shutdown = self.shutdown.subscribe();

        let job = async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    warn!(%job_id, session_id = session.id, "Finalization abandoned at shutdown");
                    return;
                }
            }

            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };

            match finalizer.finalize(&session).await {
                Ok(report) => info!(
                    %job_id,
                    session_id = session.id,
                    linked = report.linked,
                    classified = report.classified,
                    marked_partial = report.marked_partial,
                    absences_inserted = report.absences_inserted,
                    failures = report.failures,
                    "Session finalized"
                ),
                Err(e) => error!(
                    %job_id,
                    session_id = session.id,
                    error = %e,
                    "Finalization failed, abandoning"
                ),
            }
        };

        let Ok(mut jobs) = self.jobs.lock() else {
            error!(%job_id, "Job registry poisoned, finalization not queued");
            return None;
        };
        // reap finished jobs so the set does not grow without bound
        while let Some(done) = jobs.try_join_next() {
            log_join_failure(done);
        }
        jobs.spawn_on(job, &self.runtime);

        info!(%job_id, delay_secs = delay.as_secs(), "Finalization scheduled");
        Some(job_id)
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub async fn drain(&self) {
        self.accepting.store(false, Ordering::Release);
        self.shutdown.send_replace(true);

        let mut jobs = match self.jobs.lock() {
            Ok(mut jobs) => std::mem::take(&mut *jobs),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let outstanding = jobs.len();
        while let Some(done) = jobs.join_next().await {
            log_join_failure(done);
        }
        info!(outstanding, "Finalization scheduler drained");
    }
}

fn log_join_failure(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "Finalization job panicked or was cancelled");
    }
}
