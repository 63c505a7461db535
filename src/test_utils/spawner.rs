//! Scripted [`Spawn`] implementation for exercising the dispatcher.
//!
//! Every spawned worker follows one [`Behavior`]: the next one from the
//! configured sequence, or the default once the sequence is used up.
//!
//! # Example
//! ```ignore
//! // first worker hangs, every later one answers
//! let spawner = ScriptedSpawner::new(Behavior::Respond).with_sequence([Behavior::Hang]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::jobs::JobRegistry;
use crate::worker::protocol::{JobRequest, JobResponse, Outcome, RequestId, WorkerId};
use crate::worker::{Spawn, WorkerChannel, WorkerEvent};

use super::StubBackend;

/// What a scripted worker does with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Runs the job and answers immediately.
    Respond,
    /// Never answers.
    Hang,
    /// Exits on the first request.
    Crash,
    /// Parks the request until the test releases it.
    Hold,
}

struct Held {
    worker: WorkerId,
    request: JobRequest,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

struct Inner {
    default: Behavior,
    sequence: Mutex<VecDeque<Behavior>>,
    registry: JobRegistry,
    refuse: AtomicBool,
    spawned: AtomicUsize,
    log: Mutex<Vec<(WorkerId, RequestId)>>,
    held: Mutex<Vec<Held>>,
}

/// Spawner whose workers are tokio tasks following a script.
#[derive(Clone)]
pub struct ScriptedSpawner {
    inner: Arc<Inner>,
}

impl ScriptedSpawner {
    /// Every worker follows `default`.
    #[must_use]
    pub fn new(default: Behavior) -> Self {
        Self {
            inner: Arc::new(Inner {
                default,
                sequence: Mutex::new(VecDeque::new()),
                registry: JobRegistry::new().with_backend(Arc::new(StubBackend::new(2))),
                refuse: AtomicBool::new(false),
                spawned: AtomicUsize::new(0),
                log: Mutex::new(Vec::new()),
                held: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The first workers follow `sequence`, in order.
    #[must_use]
    pub fn with_sequence(self, sequence: impl IntoIterator<Item = Behavior>) -> Self {
        self.inner.sequence.lock().extend(sequence);
        self
    }

    /// Makes every later spawn fail.
    pub fn refuse_spawns(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Workers spawned so far.
    pub fn spawned(&self) -> usize {
        self.inner.spawned.load(Ordering::SeqCst)
    }

    /// `(worker, request)` pairs in delivery order.
    pub fn deliveries(&self) -> Vec<(WorkerId, RequestId)> {
        self.inner.log.lock().clone()
    }

    /// Requests parked by [`Behavior::Hold`] workers.
    pub fn held(&self) -> usize {
        self.inner.held.lock().len()
    }

    /// Answers the `index`-th parked request.
    ///
    /// # Panics
    /// If nothing is parked at `index`.
    pub fn release(&self, index: usize) {
        let held = self.inner.held.lock().remove(index);
        let outcome = Outcome::from(self.inner.registry.execute(held.request.job));
        let _ = held.events.send(WorkerEvent::Response {
            worker: held.worker,
            response: JobResponse {
                id: held.request.id,
                outcome,
            },
        });
    }

    /// Sends a bogus answer carrying `id` on behalf of the `index`-th parked request.
    ///
    /// # Panics
    /// If nothing is parked at `index`.
    pub fn forge(&self, index: usize, id: RequestId) {
        let held = self.inner.held.lock();
        let entry = &held[index];
        let _ = entry.events.send(WorkerEvent::Response {
            worker: entry.worker,
            response: JobResponse {
                id,
                outcome: Outcome::Failure("forged".into()),
            },
        });
    }
}

impl Spawn for ScriptedSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> std::io::Result<WorkerChannel> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("spawn refused"));
        }
        let behavior = self
            .inner
            .sequence
            .lock()
            .pop_front()
            .unwrap_or(self.inner.default);
        self.inner.spawned.fetch_add(1, Ordering::SeqCst);

        let (tx, mut rx) = mpsc::unbounded_channel::<JobRequest>();
        let kill = CancellationToken::new();
        let token = kill.clone();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = token.cancelled() => break "killed",
                    req = rx.recv() => {
                        let Some(req) = req else { break "channel closed" };
                        inner.log.lock().push((id, req.id));
                        match behavior {
                            Behavior::Respond => {
                                let outcome = Outcome::from(inner.registry.execute(req.job));
                                let response = JobResponse { id: req.id, outcome };
                                let _ = events.send(WorkerEvent::Response { worker: id, response });
                            }
                            Behavior::Hang => {}
                            Behavior::Crash => break "crashed",
                            Behavior::Hold => inner.held.lock().push(Held {
                                worker: id,
                                request: req,
                                events: events.clone(),
                            }),
                        }
                    }
                }
            };
            let _ = events.send(WorkerEvent::Exited {
                worker: id,
                reason: reason.to_string(),
            });
        });

        Ok(WorkerChannel::new(id, tx, kill))
    }
}
