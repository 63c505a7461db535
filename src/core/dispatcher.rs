//! # Dispatcher: the single task that owns every worker of a pool.
//!
//! All pool state (workers, queue, timers, request ids) lives inside one actor
//! loop, so no lock guards any of it.
//!
//! ## Architecture
//! ```text
//! WorkerPool::execute ── Command::Submit ──┐
//! WorkerPool::close   ── Command::Drain  ──┤
//!                                          ▼
//!                             ┌──────── Dispatcher::run ────────┐
//!   WorkerEvent::Response ───►│ match id → settle caller → pump │
//!   WorkerEvent::Exited   ───►│ crash → retry once / fail       │
//!   DelayQueue expiry     ───►│ timeout → kill → retry / fail   │
//!   drain deadline        ───►│ force-kill → fail with Closed   │
//!                             └─────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - FIFO: queued jobs are dispatched in submission order; a retried job goes
//!   back to the **front** of the queue.
//! - A worker holds at most one request; an idle worker is reused before a new
//!   one is spawned, and never more than `limit` workers are alive. A killed
//!   worker keeps its slot until its `Exited` arrives.
//! - Every dispatch gets a fresh request id; responses are matched by id only,
//!   so a late answer from a killed worker is discarded, never misrouted.
//! - A job is attempted at most twice (one retry on a replacement worker).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tokio_util::time::DelayQueue;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::Job;
use crate::worker::protocol::{JobRequest, JobResponse, Outcome, RequestId, WorkerId};
use crate::worker::{Spawn, WorkerEvent};

use super::handle::{InFlight, Pending, Reply, WorkerHandle};

/// Attempts per job, the retry included.
pub(crate) const MAX_ATTEMPTS: u32 = 2;

/// Instructions from the pool handle.
pub(crate) enum Command {
    /// Queue a job; the result goes to `reply`.
    Submit { job: Job, reply: Reply },
    /// Finish outstanding work within `grace`, then stop.
    Drain {
        grace: Duration,
        done: oneshot::Sender<DrainReport>,
    },
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainReport {
    /// Jobs failed with [`JobError::Closed`] at the deadline.
    pub forced: usize,
}

/// Why an attempt ended without a response.
enum Failure {
    Timeout(Duration),
    Crashed(String),
}

impl Failure {
    fn label(&self) -> &'static str {
        match self {
            Failure::Timeout(_) => "timeout",
            Failure::Crashed(_) => "crash",
        }
    }
}

pub(crate) struct Dispatcher {
    name: Arc<str>,
    bus: Bus,
    spawner: Arc<dyn Spawn>,
    limit: usize,
    timeout: Option<Duration>,

    workers: BTreeMap<WorkerId, WorkerHandle>,
    /// Killed after a timeout, not yet exited.
    retiring: BTreeSet<WorkerId>,
    queue: VecDeque<Pending>,
    timers: DelayQueue<(WorkerId, RequestId)>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    next_worker: WorkerId,
    next_request: RequestId,
}

impl Dispatcher {
    pub fn new(
        name: Arc<str>,
        bus: Bus,
        spawner: Arc<dyn Spawn>,
        limit: usize,
        timeout: Option<Duration>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            name,
            bus,
            spawner,
            limit: limit.max(1),
            timeout,
            workers: BTreeMap::new(),
            retiring: BTreeSet::new(),
            queue: VecDeque::new(),
            timers: DelayQueue::new(),
            events_tx,
            events_rx,
            next_worker: 0,
            next_request: 0,
        }
    }

    /// Starts up to `count` workers ahead of demand.
    pub fn prespawn(&mut self, count: usize) -> std::io::Result<()> {
        for _ in 0..count.min(self.limit) {
            if let Err(e) = self.spawn_worker() {
                self.abort();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs until drained, or until every pool handle is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let deadline = time::sleep(Duration::from_secs(86_400 * 365));
        tokio::pin!(deadline);
        let mut drain: Option<(Duration, oneshot::Sender<DrainReport>)> = None;

        loop {
            if drain.is_some() && self.is_idle() {
                self.abort();
                self.publish(Event::new(EventKind::AllStoppedWithin));
                if let Some((_, done)) = drain.take() {
                    let _ = done.send(DrainReport { forced: 0 });
                }
                break;
            }

            tokio::select! {
                cmd = commands.recv(), if drain.is_none() => match cmd {
                    Some(Command::Submit { job, reply }) => self.submit(job, reply),
                    Some(Command::Drain { grace, done }) => {
                        debug!(component = %self.name, ?grace, queued = self.queue.len(), "draining worker pool");
                        deadline.as_mut().reset(Instant::now() + grace);
                        drain = Some((grace, done));
                    }
                    None => {
                        self.abort();
                        return;
                    }
                },
                Some(ev) = self.events_rx.recv() => self.on_worker_event(ev),
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    let (worker, request) = expired.into_inner();
                    self.on_timeout(worker, request);
                }
                () = &mut deadline, if drain.is_some() => {
                    let forced = self.abort();
                    if let Some((grace, done)) = drain.take() {
                        warn!(component = %self.name, ?grace, forced, "grace exceeded; workers force-terminated");
                        self.publish(
                            Event::new(EventKind::GraceExceeded)
                                .with_timeout(grace)
                                .with_reason(format!("{forced} jobs force-terminated")),
                        );
                        let _ = done.send(DrainReport { forced });
                    }
                    break;
                }
            }
        }

        commands.close();
        while let Ok(cmd) = commands.try_recv() {
            match cmd {
                Command::Submit { reply, .. } => {
                    let _ = reply.send(Err(JobError::Closed));
                }
                Command::Drain { done, .. } => {
                    let _ = done.send(DrainReport { forced: 0 });
                }
            }
        }
    }

    fn submit(&mut self, job: Job, reply: Reply) {
        self.queue.push_back(Pending::new(job, reply));
        self.pump();
    }

    /// Hands queued jobs to idle workers, spawning up to the limit.
    fn pump(&mut self) {
        while let Some(pending) = self.queue.pop_front() {
            if pending.is_abandoned() {
                continue;
            }
            let worker = match self.idle_worker() {
                Some(id) => id,
                None if self.alive() < self.limit => match self.spawn_worker() {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(component = %self.name, error = %e, "worker spawn failed");
                        pending.settle(Err(JobError::Spawn {
                            reason: e.to_string(),
                        }));
                        continue;
                    }
                },
                None => {
                    self.queue.push_front(pending);
                    break;
                }
            };
            if let Err(pending) = self.dispatch(worker, pending) {
                self.queue.push_front(pending);
            }
        }
    }

    /// Workers holding a slot, retiring ones included.
    fn alive(&self) -> usize {
        self.workers.len() + self.retiring.len()
    }

    /// Lowest-numbered idle worker.
    fn idle_worker(&self) -> Option<WorkerId> {
        self.workers
            .values()
            .find(|h| h.is_idle())
            .map(WorkerHandle::id)
    }

    fn spawn_worker(&mut self) -> std::io::Result<WorkerId> {
        let id = self.next_worker;
        self.next_worker += 1;
        let channel = self.spawner.spawn(id, self.events_tx.clone())?;
        self.workers.insert(id, WorkerHandle::new(channel));
        debug!(component = %self.name, worker = id, alive = self.alive(), "worker spawned");
        self.publish(Event::new(EventKind::WorkerSpawned).with_worker(id));
        Ok(id)
    }

    fn dispatch(&mut self, worker: WorkerId, mut pending: Pending) -> Result<(), Pending> {
        let Some(handle) = self.workers.get_mut(&worker) else {
            return Err(pending);
        };
        let request = self.next_request;
        self.next_request += 1;

        let sent = handle.channel().send(JobRequest {
            id: request,
            job: pending.job.clone(),
        });
        if sent.is_err() {
            debug!(component = %self.name, worker, "worker gone before dispatch");
            handle.kill();
            return Err(pending);
        }

        pending.attempts += 1;
        let timer = self
            .timeout
            .map(|t| self.timers.insert((worker, request), t));
        self.bus.publish(
            Event::new(EventKind::JobDispatched)
                .with_component(Arc::clone(&self.name))
                .with_worker(worker)
                .with_request(request)
                .with_job(pending.name())
                .with_attempt(pending.attempts),
        );
        handle.assign(InFlight {
            request,
            pending,
            timer,
        });
        Ok(())
    }

    fn on_worker_event(&mut self, ev: WorkerEvent) {
        match ev {
            WorkerEvent::Response { worker, response } => self.on_response(worker, response),
            WorkerEvent::Exited { worker, reason } => self.on_exit(worker, reason),
        }
    }

    fn on_response(&mut self, worker: WorkerId, response: JobResponse) {
        let flight = self
            .workers
            .get_mut(&worker)
            .and_then(|h| h.take_if(response.id));
        let Some(flight) = flight else {
            warn!(component = %self.name, worker, request = response.id, "discarding unmatched response");
            self.publish(
                Event::new(EventKind::ResponseDiscarded)
                    .with_worker(worker)
                    .with_request(response.id),
            );
            return;
        };

        if let Some(key) = flight.timer {
            self.timers.remove(&key);
        }
        let job = flight.pending.name();
        let res = match response.outcome {
            Outcome::Success(out) => Ok(out),
            Outcome::Failure(message) => Err(JobError::Failed { job, message }),
        };
        flight.pending.settle(res);
        self.pump();
    }

    fn on_exit(&mut self, worker: WorkerId, reason: String) {
        if self.retiring.remove(&worker) {
            debug!(component = %self.name, worker, %reason, "killed worker retired");
            self.publish(
                Event::new(EventKind::WorkerExited)
                    .with_worker(worker)
                    .with_reason(reason),
            );
            self.pump();
            return;
        }
        let Some(mut handle) = self.workers.remove(&worker) else {
            return;
        };
        debug!(
            component = %self.name,
            worker,
            served = handle.served(),
            idle_for = ?handle.idle_for(),
            %reason,
            "worker exited"
        );
        self.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(worker)
                .with_reason(reason.clone()),
        );

        if let Some(flight) = handle.take() {
            if let Some(key) = flight.timer {
                self.timers.remove(&key);
            }
            warn!(component = %self.name, worker, request = flight.request, job = flight.pending.name(), %reason, "worker crashed mid-job");
            self.publish(
                Event::new(EventKind::WorkerCrashed)
                    .with_worker(worker)
                    .with_request(flight.request)
                    .with_job(flight.pending.name())
                    .with_reason(reason.clone()),
            );
            self.retry_or_fail(flight.pending, Failure::Crashed(reason));
        }
        self.pump();
    }

    fn on_timeout(&mut self, worker: WorkerId, request: RequestId) {
        if !self.workers.get(&worker).is_some_and(|h| h.holds(request)) {
            return;
        }
        let Some(mut handle) = self.workers.remove(&worker) else {
            return;
        };
        handle.kill();
        self.retiring.insert(worker);
        let Some(flight) = handle.take() else {
            return;
        };

        let timeout = self.timeout.unwrap_or_default();
        warn!(component = %self.name, worker, request, job = flight.pending.name(), ?timeout, "job timed out; killing worker");
        self.publish(
            Event::new(EventKind::JobTimedOut)
                .with_worker(worker)
                .with_request(request)
                .with_job(flight.pending.name())
                .with_timeout(timeout),
        );
        self.retry_or_fail(flight.pending, Failure::Timeout(timeout));
        self.pump();
    }

    fn retry_or_fail(&mut self, pending: Pending, failure: Failure) {
        if pending.attempts < MAX_ATTEMPTS {
            self.publish(
                Event::new(EventKind::JobRetried)
                    .with_job(pending.name())
                    .with_attempt(pending.attempts + 1)
                    .with_reason(failure.label()),
            );
            self.queue.push_front(pending);
            return;
        }

        let attempts = pending.attempts;
        let err = match failure {
            Failure::Timeout(timeout) => JobError::Timeout { timeout, attempts },
            Failure::Crashed(reason) => JobError::Crashed { reason, attempts },
        };
        warn!(component = %self.name, job = pending.name(), error = %err, "job failed on every attempt");
        pending.settle(Err(err));
    }

    /// Nothing queued, nothing in flight.
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.workers.values().any(WorkerHandle::is_busy)
    }

    /// Kills every worker and fails everything outstanding with `Closed`.
    fn abort(&mut self) -> usize {
        let mut forced = 0;
        for (_, mut handle) in std::mem::take(&mut self.workers) {
            handle.kill();
            if let Some(flight) = handle.take() {
                flight.pending.settle(Err(JobError::Closed));
                forced += 1;
            }
        }
        for pending in self.queue.drain(..) {
            pending.settle(Err(JobError::Closed));
            forced += 1;
        }
        self.timers.clear();
        self.retiring.clear();
        forced
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_component(Arc::clone(&self.name)));
    }
}
