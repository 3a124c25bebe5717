//! Worker pool that runs bucket jobs off a two-lane queue.
//!
//! Each enqueued prefix becomes one independent [`JobRunner::run`] call on
//! whichever worker picks it up. Workers always drain the default lane before
//! the low lane. Bucket rebuilds are enqueued on the low lane.
//!
//! A failed job is logged and dropped; it is never retried here. Buckets are
//! kept fresh by the scheduler re-enqueueing every known prefix periodically.
//! Two runs for the same prefix are not ordered against each other: the last
//! successful publish wins.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::contract::{Publisher, RecordSource};
use crate::job::JobRunner;

/// Scheduling lane for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Default,
    Low,
}

/// Lane used by [`JobQueue::enqueue`] for bucket rebuilds.
pub const BUCKET_JOB_PRIORITY: Priority = Priority::Low;

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is shut down; dropped prefix {0:?}")]
    Closed(String),
}

/// What happened to every job the queue ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl QueueSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Lanes {
    default: mpsc::UnboundedReceiver<String>,
    low: mpsc::UnboundedReceiver<String>,
}

impl Lanes {
    async fn next(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            Some(prefix) = self.default.recv() => Some(prefix),
            Some(prefix) = self.low.recv() => Some(prefix),
            else => None,
        }
    }
}

/// Fixed-size pool of workers sharing one runner.
pub struct JobQueue {
    default_tx: mpsc::UnboundedSender<String>,
    low_tx: mpsc::UnboundedSender<String>,
    workers: Vec<JoinHandle<()>>,
    summary: Arc<Mutex<QueueSummary>>,
}

impl JobQueue {
    pub fn start<S, P>(runner: Arc<JobRunner<S, P>>, config: QueueConfig) -> Self
    where
        S: RecordSource + 'static,
        P: Publisher + 'static,
    {
        let (default_tx, default_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();
        let lanes = Arc::new(tokio::sync::Mutex::new(Lanes {
            default: default_rx,
            low: low_rx,
        }));
        let summary = Arc::new(Mutex::new(QueueSummary::default()));
        let worker_count = config.workers.max(1);

        let workers = (0..worker_count)
            .map(|worker| {
                let lanes = Arc::clone(&lanes);
                let runner = Arc::clone(&runner);
                let summary = Arc::clone(&summary);
                tokio::spawn(async move {
                    loop {
                        let next = lanes.lock().await.next().await;
                        let Some(prefix) = next else {
                            break;
                        };
                        let result = runner.run(&prefix).await;
                        let mut summary = match summary.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        match result {
                            Ok(_) => summary.succeeded.push(prefix),
                            Err(e) => {
                                error!(worker, prefix = %prefix, error = %e, "[QUEUE] Job failed, dropping");
                                summary.failed.push((prefix, e.to_string()));
                            }
                        }
                    }
                })
            })
            .collect();

        info!(workers = worker_count, "[QUEUE] Started");
        Self {
            default_tx,
            low_tx,
            workers,
            summary,
        }
    }

    /// Queue a bucket rebuild for `prefix` on the bucket job lane.
    pub fn enqueue(&self, prefix: impl Into<String>) -> Result<(), QueueError> {
        self.enqueue_with(prefix, BUCKET_JOB_PRIORITY)
    }

    pub fn enqueue_with(&self, prefix: impl Into<String>, priority: Priority) -> Result<(), QueueError> {
        let prefix = prefix.into();
        let lane = match priority {
            Priority::Default => &self.default_tx,
            Priority::Low => &self.low_tx,
        };
        lane.send(prefix).map_err(|e| QueueError::Closed(e.0))
    }

    /// Close both lanes, let workers drain them, and report.
    pub async fn shutdown(self) -> QueueSummary {
        let JobQueue {
            default_tx,
            low_tx,
            workers,
            summary,
        } = self;
        drop(default_tx);
        drop(low_tx);

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                warn!(error = %e, "[QUEUE] Worker task ended abnormally");
            }
        }

        let summary = match summary.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "[QUEUE] Drained"
        );
        summary
    }
}
