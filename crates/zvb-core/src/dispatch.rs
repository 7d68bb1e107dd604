//! Supervised background work (account dispatch, restart sequence).
//!
//! Jobs are bounded by a semaphore, tracked so callers can wait for them, and
//! cancelled through one shared token at their next suspension point.

use std::{future::Future, sync::Arc};

use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    pub name: &'static str,
    pub outcome: JobOutcome,
}

pub struct TaskSupervisor {
    tracker: TaskTracker,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
}

impl TaskSupervisor {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(max_jobs.max(1))),
            reports: None,
        }
    }

    /// Same as `new`, plus a channel that receives one report per finished job.
    pub fn with_reports(max_jobs: usize) -> (Self, mpsc::UnboundedReceiver<JobReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sup = Self::new(max_jobs);
        sup.reports = Some(tx);
        (sup, rx)
    }

    pub fn spawn<F>(&self, name: &'static str, job: F) -> JoinHandle<JobOutcome>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let permits = self.permits.clone();
        let reports = self.reports.clone();

        self.tracker.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => JobOutcome::Cancelled,
                outcome = async {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return JobOutcome::Cancelled;
                    };
                    match job.await {
                        Ok(()) => JobOutcome::Completed,
                        Err(e) => JobOutcome::Failed(e.to_string()),
                    }
                } => outcome,
            };

            match &outcome {
                JobOutcome::Failed(e) => warn!(job = name, error = %e, "background job failed"),
                other => debug!(job = name, outcome = ?other, "background job finished"),
            }
            if let Some(tx) = reports {
                let _ = tx.send(JobReport {
                    name,
                    outcome: outcome.clone(),
                });
            }
            outcome
        })
    }

    /// Ask every running and queued job to stop.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Wait until every job spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
