// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Job queue with per-key serialization. Jobs submitted under the same key
//! run to completion in submission order; jobs under distinct keys run
//! concurrently. Enqueueing never blocks and accepted jobs cannot be
//! cancelled.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("job '{key}' failed: {reason}")]
    Failed { key: String, reason: String },

    #[error("job was dropped before completion")]
    Dropped,
}

pub type JobResult = Result<(), JobError>;

type UnitOfWork = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

struct Job {
    key: Arc<str>,
    work: UnitOfWork,
    done: oneshot::Sender<JobResult>,
}

/// Handle to one enqueued job. Awaiting it yields the job outcome; dropping
/// it detaches from the job without cancelling it.
pub struct JobHandle {
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Wait until the job has run and return its outcome.
    pub async fn wait(self) -> JobResult {
        match self.rx.await {
            Ok(result) => result,
            /* worker went away before running the job */
            Err(_) => Err(JobError::Dropped),
        }
    }
}

/// The coordinator: one worker task per key, draining an unbounded channel.
#[derive(Default)]
pub struct JobQueue {
    workers: DashMap<Arc<str>, mpsc::UnboundedSender<Job>>,
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a unit of work under the given key. Must be called from within
    /// a tokio runtime: the per-key worker is spawned on first use of a key.
    pub fn enqueue<F>(&self, key: &str, work: F) -> JobHandle
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let key: Arc<str> = Arc::from(key);
        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            key: key.clone(),
            work: Box::pin(work),
            done: done_tx,
        };
        let tx = self
            .workers
            .entry(key.clone())
            .or_insert_with(|| Self::spawn_worker(&key))
            .clone();
        if let Err(send_error) = tx.send(job) {
            /* worker gone (runtime recycled): respawn and resubmit */
            let tx = Self::spawn_worker(&key);
            let _ = tx.send(send_error.0);
            self.workers.insert(key, tx);
        }
        JobHandle { rx: done_rx }
    }

    /// Number of keys with a live worker.
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(key: &Arc<str>) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let key = key.clone();
        tokio::spawn(async move {
            debug!("job worker started for key '{key}'");
            while let Some(job) = rx.recv().await {
                let result = match job.work.await {
                    Ok(()) => Ok(()),
                    Err(reason) => {
                        /* a failed job is logged and never retried; the next
                         * job on the same key is unaffected */
                        error!("job for key '{}' failed: {reason}", job.key);
                        Err(JobError::Failed {
                            key: job.key.to_string(),
                            reason,
                        })
                    }
                };
                let _ = job.done.send(result);
            }
        });
        tx
    }
}
