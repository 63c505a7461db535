//! # ThreadSpawner: worker units backed by dedicated OS threads.
//!
//! Each worker owns one thread running the [`JobRegistry`] directly; requests
//! arrive over an unbounded channel and responses leave on the dispatcher's
//! event stream.
//!
//! ## Rules
//! - One request at a time per thread (the dispatcher never sends a second one early).
//! - A panicking job ends the thread; the dispatcher sees `Exited`.
//! - Threads cannot be killed from outside. `kill()` is cooperative: a running
//!   `mine` search stops at its next poll, any other job runs to completion,
//!   and the thread then retires and reports `Exited`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::jobs::JobRegistry;

use super::channel::{Spawn, WorkerChannel, WorkerEvent};
use super::protocol::{JobRequest, JobResponse, Outcome, WorkerId};

/// Starts in-process thread workers.
#[derive(Clone, Debug)]
pub struct ThreadSpawner {
    registry: Arc<JobRegistry>,
}

impl ThreadSpawner {
    /// Creates a spawner whose threads execute jobs with `registry`.
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> std::io::Result<WorkerChannel> {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();
        let registry = Arc::clone(&self.registry);
        let kill = CancellationToken::new();
        let token = kill.clone();

        std::thread::Builder::new()
            .name(format!("workvisor-worker-{id}"))
            .spawn(move || {
                let _exit = ExitNotice {
                    worker: id,
                    events: events.clone(),
                };
                while let Some(JobRequest { id: request, job }) = rx.blocking_recv() {
                    if token.is_cancelled() {
                        break;
                    }
                    let outcome = Outcome::from(registry.execute_until(job, &|| token.is_cancelled()));
                    if token.is_cancelled() {
                        break;
                    }
                    let response = JobResponse {
                        id: request,
                        outcome,
                    };
                    if events
                        .send(WorkerEvent::Response {
                            worker: id,
                            response,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            })?;

        Ok(WorkerChannel::new(id, tx, kill))
    }
}

/// Reports the thread's end, including unwinding out of a panicking job.
struct ExitNotice {
    worker: WorkerId,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let reason = if std::thread::panicking() {
            "job panicked"
        } else {
            "thread exited"
        };
        let _ = self.events.send(WorkerEvent::Exited {
            worker: self.worker,
            reason: reason.to_string(),
        });
    }
}
