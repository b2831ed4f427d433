//! Bounded pipeline worker pool
//!
//! A fixed set of workers pulls jobs from a bounded queue. Submission returns a
//! [`JobHandle`] right away; callers that care about the outcome await `done`.
//! A video has at most one queued or running job at a time.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidquiz_common::events::{EventBus, PipelineEvent};

use super::pipeline_orchestrator::{PipelineError, PipelineReport};
use crate::config::AdmissionPolicy;

/// What a job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Transcribe, segment and generate questions for an UPLOADED video
    Pipeline,
    /// Re-run question generation for PENDING/FAILED segments
    GenerateQuestions,
}

impl JobKind {
    /// Verb phrase used in state errors
    pub fn operation(&self) -> &'static str {
        match self {
            JobKind::Pipeline => "start transcription of",
            JobKind::GenerateQuestions => "generate questions for",
        }
    }
}

/// Executes jobs on behalf of the pool
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(
        &self,
        kind: JobKind,
        video_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError>;

    /// Record the failure of a job whose `run` panicked before finishing
    async fn fail_abandoned(&self, video_id: Uuid, error: &PipelineError);
}

pub type JobResult = Result<PipelineReport, PipelineError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Job queue is full")]
    QueueFull,

    #[error("Video {0} already has a queued or running job")]
    AlreadyQueued(Uuid),

    #[error("Worker pool is shutting down")]
    ShuttingDown,
}

/// Returned by [`PipelineWorkers::submit`]
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub video_id: Uuid,
    pub kind: JobKind,
    pub cancel: CancellationToken,
    /// Resolves once the job finished; errors if the pool dropped the job
    pub done: oneshot::Receiver<JobResult>,
}

struct Job {
    job_id: Uuid,
    video_id: Uuid,
    kind: JobKind,
    cancel: CancellationToken,
    done: oneshot::Sender<JobResult>,
}

#[derive(Clone)]
struct InFlight {
    job_id: Uuid,
    cancel: CancellationToken,
}

type InFlightMap = Arc<Mutex<HashMap<Uuid, InFlight>>>;

/// Bounded worker pool for pipeline jobs
pub struct PipelineWorkers {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    in_flight: InFlightMap,
    admission: AdmissionPolicy,
    shutdown_token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    event_bus: EventBus,
}

impl PipelineWorkers {
    /// Spawn `worker_count` workers over a queue of `queue_capacity` jobs
    pub fn start(
        runner: Arc<dyn JobRunner>,
        worker_count: usize,
        queue_capacity: usize,
        admission: AdmissionPolicy,
        event_bus: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight: InFlightMap = Arc::new(Mutex::new(HashMap::new()));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&runner),
                    Arc::clone(&in_flight),
                ))
            })
            .collect();

        tracing::info!(worker_count, queue_capacity, ?admission, "Pipeline workers started");

        Self {
            sender: Mutex::new(Some(tx)),
            in_flight,
            admission,
            shutdown_token: CancellationToken::new(),
            workers: Mutex::new(workers),
            event_bus,
        }
    }

    /// Queue a job for `video_id`
    pub async fn submit(&self, kind: JobKind, video_id: Uuid) -> Result<JobHandle, SubmitError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or(SubmitError::ShuttingDown)?;

        let job_id = Uuid::new_v4();
        let cancel = self.shutdown_token.child_token();
        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains_key(&video_id) {
                return Err(SubmitError::AlreadyQueued(video_id));
            }
            in_flight.insert(
                video_id,
                InFlight {
                    job_id,
                    cancel: cancel.clone(),
                },
            );
        }

        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            job_id,
            video_id,
            kind,
            cancel: cancel.clone(),
            done: done_tx,
        };

        let sent = match self.admission {
            AdmissionPolicy::Reject => sender.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SubmitError::ShuttingDown,
            }),
            AdmissionPolicy::Wait => sender.send(job).await.map_err(|_| SubmitError::ShuttingDown),
        };

        if let Err(e) = sent {
            self.in_flight.lock().await.remove(&video_id);
            tracing::warn!(video_id = %video_id, ?kind, error = %e, "Job submission rejected");
            return Err(e);
        }

        tracing::info!(job_id = %job_id, video_id = %video_id, ?kind, "Job queued");
        self.event_bus.emit_lossy(PipelineEvent::JobQueued {
            job_id,
            video_id,
            timestamp: Utc::now(),
        });

        Ok(JobHandle {
            job_id,
            video_id,
            kind,
            cancel,
            done: done_rx,
        })
    }

    /// Cancel the queued or running job for `video_id`; false if there is none
    pub async fn cancel(&self, video_id: Uuid) -> bool {
        match self.in_flight.lock().await.get(&video_id) {
            Some(entry) => {
                tracing::info!(job_id = %entry.job_id, video_id = %video_id, "Cancelling job");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Jobs queued or running
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Cancel everything, close the queue and wait for workers to exit
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down pipeline workers");
        self.shutdown_token.cancel();
        self.sender.lock().await.take();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Pipeline worker panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    runner: Arc<dyn JobRunner>,
    in_flight: InFlightMap,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            tracing::debug!(worker_id, "Job queue closed, worker exiting");
            return;
        };

        tracing::debug!(worker_id, job_id = %job.job_id, video_id = %job.video_id, "Job started");

        let outcome = AssertUnwindSafe(runner.run(job.kind, job.video_id, job.cancel.clone()))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let err = PipelineError::Panicked(panic_message(payload.as_ref()));
                tracing::error!(
                    worker_id,
                    job_id = %job.job_id,
                    video_id = %job.video_id,
                    error = %err,
                    "Job panicked"
                );
                runner.fail_abandoned(job.video_id, &err).await;
                Err(err)
            }
        };

        if let Err(e) = &result {
            tracing::debug!(worker_id, job_id = %job.job_id, error = %e, "Job finished with error");
        }

        {
            let mut map = in_flight.lock().await;
            if map.get(&job.video_id).is_some_and(|e| e.job_id == job.job_id) {
                map.remove(&job.video_id);
            }
        }

        // Receiver may be gone; HTTP callers don't wait
        let _ = job.done.send(result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
