//! Remote worker job channel
//!
//! A connected worker process receives build jobs and reports back
//! incremental log lines plus a single terminal job-status event. The
//! handle wraps both directions; the event receiver is shared behind a
//! mutex so the handle stays cloneable inside a build request.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// A build job dispatched to a remote worker.
///
/// `cmd` is an argument vector, never an interpolated shell string. The
/// shared worker secret authenticates the job on the worker side and is
/// masked in Debug output so it cannot leak into logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub mock: bool,
    pub build_id: String,
    pub source_id: String,
    pub owner: String,
    pub udid: String,
    pub path: String,
    pub cmd: Vec<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for JobMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMessage")
            .field("mock", &self.mock)
            .field("build_id", &self.build_id)
            .field("source_id", &self.source_id)
            .field("owner", &self.owner)
            .field("udid", &self.udid)
            .field("path", &self.path)
            .field("cmd", &self.cmd)
            .field("secret", &self.secret.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Events a worker reports back for a dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    /// An incremental chunk of build log output.
    Log { line: String },
    /// Terminal job state; `OK` means success.
    JobStatus { status: String },
}

/// Receiving half of the job channel, held by the worker transport.
pub type WorkerJobReceiver = mpsc::UnboundedReceiver<JobMessage>;

/// Handle to a connected remote worker.
#[derive(Clone)]
pub struct WorkerHandle {
    jobs: mpsc::UnboundedSender<JobMessage>,
    events: Arc<Mutex<mpsc::UnboundedReceiver<WorkerEvent>>>,
}

impl WorkerHandle {
    /// Create a handle plus the transport ends: the job receiver the
    /// worker connection drains, and the event sender it reports on.
    #[must_use]
    pub fn pair() -> (Self, WorkerJobReceiver, mpsc::UnboundedSender<WorkerEvent>) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                jobs: job_tx,
                events: Arc::new(Mutex::new(event_rx)),
            },
            job_rx,
            event_tx,
        )
    }

    /// Dispatch a job to the worker. Returns `false` if the worker
    /// connection is gone.
    pub fn dispatch(&self, job: JobMessage) -> bool {
        self.jobs.send(job).is_ok()
    }

    /// Await the next event from the worker; `None` when the worker
    /// disconnected without a terminal status.
    pub async fn next_event(&self) -> Option<WorkerEvent> {
        self.events.lock().await.recv().await
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle").finish_non_exhaustive()
    }
}
