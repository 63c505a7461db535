//! # WorkerChannel: the coordinator's end of one worker unit.
//!
//! A [`Spawn`] implementation starts a worker and returns a [`WorkerChannel`]
//! for sending requests. Everything coming back (responses, exit) is reported
//! on the shared [`WorkerEvent`] stream consumed by the dispatcher.
//!
//! ```text
//!  Dispatcher ── WorkerChannel::send(JobRequest) ──► worker unit
//!      ▲                                                 │
//!      └──────── WorkerEvent::{Response, Exited} ◄───────┘
//! ```

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::{JobRequest, JobResponse, WorkerId};

/// Message from a worker unit to the dispatcher.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker answered a request.
    Response {
        worker: WorkerId,
        response: JobResponse,
    },
    /// The worker is gone (exit, crash, kill). Sent at most once per worker.
    Exited { worker: WorkerId, reason: String },
}

/// Starts worker units.
pub trait Spawn: Send + Sync + 'static {
    /// Starts worker `id`, reporting its responses and exit on `events`.
    ///
    /// Called from within the Tokio runtime.
    fn spawn(
        &self,
        id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> std::io::Result<WorkerChannel>;
}

/// Request side of one worker unit.
#[derive(Debug)]
pub struct WorkerChannel {
    id: WorkerId,
    requests: mpsc::UnboundedSender<JobRequest>,
    kill: CancellationToken,
}

impl WorkerChannel {
    /// Wraps the request queue and kill switch of a freshly started worker.
    pub fn new(
        id: WorkerId,
        requests: mpsc::UnboundedSender<JobRequest>,
        kill: CancellationToken,
    ) -> Self {
        Self { id, requests, kill }
    }

    /// Worker identity.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Queues `request` for the worker; gives it back if the worker is gone.
    pub fn send(&self, request: JobRequest) -> Result<(), JobRequest> {
        self.requests.send(request).map_err(|e| e.0)
    }

    /// Asks the transport to terminate the worker.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// True once [`kill`](Self::kill) was called.
    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }
}
