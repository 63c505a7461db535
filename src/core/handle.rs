//! # Dispatcher-side bookkeeping for worker units and requests.
//!
//! ```text
//! Pending ──dispatch──► InFlight (held by exactly one WorkerHandle)
//!    ▲                        │
//!    └──── retry (timeout / crash, once) ◄──┘
//! ```
//!
//! A [`WorkerHandle`] holds at most one [`InFlight`] request at a time.

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::time::delay_queue;

use crate::error::JobError;
use crate::jobs::{Job, JobOutput};
use crate::worker::WorkerChannel;
use crate::worker::protocol::{RequestId, WorkerId};

/// Where a job's result goes.
pub(crate) type Reply = oneshot::Sender<Result<JobOutput, JobError>>;

/// A submitted job that has not settled yet.
pub(crate) struct Pending {
    pub job: Job,
    pub reply: Reply,
    /// Dispatches made so far.
    pub attempts: u32,
}

impl Pending {
    pub fn new(job: Job, reply: Reply) -> Self {
        Self {
            job,
            reply,
            attempts: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    /// The caller stopped waiting.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    pub fn settle(self, res: Result<JobOutput, JobError>) {
        let _ = self.reply.send(res);
    }
}

/// A pending job bound to one request id on one worker.
pub(crate) struct InFlight {
    pub request: RequestId,
    pub pending: Pending,
    pub timer: Option<delay_queue::Key>,
}

/// One live worker unit.
pub(crate) struct WorkerHandle {
    channel: WorkerChannel,
    current: Option<InFlight>,
    last_activity: Instant,
    served: u64,
}

impl WorkerHandle {
    pub fn new(channel: WorkerChannel) -> Self {
        Self {
            channel,
            current: None,
            last_activity: Instant::now(),
            served: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.channel.id()
    }

    pub fn channel(&self) -> &WorkerChannel {
        &self.channel
    }

    /// Not killed; killed workers are never assigned new work.
    pub fn is_alive(&self) -> bool {
        !self.channel.is_killed()
    }

    /// Alive and holding nothing.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.is_alive()
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn holds(&self, request: RequestId) -> bool {
        self.current.as_ref().is_some_and(|f| f.request == request)
    }

    pub fn assign(&mut self, flight: InFlight) {
        debug_assert!(self.current.is_none(), "worker already holds a request");
        self.last_activity = Instant::now();
        self.current = Some(flight);
    }

    /// Takes the in-flight request if it is `request`.
    pub fn take_if(&mut self, request: RequestId) -> Option<InFlight> {
        if self.holds(request) {
            self.served += 1;
            self.last_activity = Instant::now();
            self.current.take()
        } else {
            None
        }
    }

    /// Takes whatever is in flight.
    pub fn take(&mut self) -> Option<InFlight> {
        self.current.take()
    }

    pub fn kill(&self) {
        self.channel.kill();
    }

    /// Requests answered by this worker.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Time since the last dispatch or answer.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}
