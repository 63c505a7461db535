//! # Runtime events emitted by lifecycle controllers and the worker pool.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: component transitions (preopen, open, preclose, close, error)
//! - **Worker events**: worker units coming and going, dispatch, timeouts, retries
//! - **Subscriber events**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! component/worker identity, request ids and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use workvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::JobTimedOut)
//!     .with_component("workers")
//!     .with_worker(3)
//!     .with_request(42)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::JobTimedOut);
//! assert_eq!(ev.worker, Some(3));
//! assert_eq!(ev.timeout_ms, Some(5000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// Open transition started; the `on_open` hook is about to run.
    ///
    /// Sets: `component`
    PreOpen,

    /// Component is open.
    ///
    /// Sets: `component`
    Open,

    /// Close transition started; the `on_close` hook is about to run.
    ///
    /// Sets: `component`
    PreClose,

    /// Component is closed.
    ///
    /// Sets: `component`
    Close,

    /// A transition failed (general error channel).
    ///
    /// Sets: `component`, `reason`
    LifecycleFailed,

    // === Worker events ===
    /// Worker unit started.
    ///
    /// Sets: `component`, `worker`
    WorkerSpawned,

    /// Worker unit exited or was killed.
    ///
    /// Sets: `component`, `worker`, `reason`
    WorkerExited,

    /// Request sent to a worker.
    ///
    /// Sets: `component`, `worker`, `request`, `job`, `attempt`
    JobDispatched,

    /// No response within the timeout; the worker is killed.
    ///
    /// Sets: `component`, `worker`, `request`, `job`, `timeout_ms`
    JobTimedOut,

    /// Worker exited while holding a request.
    ///
    /// Sets: `component`, `worker`, `request`, `job`, `reason`
    WorkerCrashed,

    /// Request re-queued for a replacement worker.
    ///
    /// Sets: `component`, `job`, `attempt`, `reason`
    JobRetried,

    /// Response with no matching outstanding request was dropped.
    ///
    /// Sets: `component`, `worker`, `request`
    ResponseDiscarded,

    /// Drain finished within the grace period.
    ///
    /// Sets: `component`
    AllStoppedWithin,

    /// Grace period exceeded; remaining work was force-terminated.
    ///
    /// Sets: `component`, `reason`
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `component` (subscriber name), `reason`
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `component` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Component (or subscriber) name.
    pub component: Option<Arc<str>>,
    /// Worker identity.
    pub worker: Option<u64>,
    /// Request id.
    pub request: Option<u64>,
    /// Job name.
    pub job: Option<&'static str>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, exit status, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            worker: None,
            request: None,
            job: None,
            attempt: None,
            timeout_ms: None,
            reason: None,
        }
    }

    /// Attaches a component name.
    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attaches a worker identity.
    #[inline]
    pub fn with_worker(mut self, worker: u64) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a request id.
    #[inline]
    pub fn with_request(mut self, id: u64) -> Self {
        self.request = Some(id);
        self
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_job(mut self, job: &'static str) -> Self {
        self.job = Some(job);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    /// True for the four transition notifications and the error channel.
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            EventKind::PreOpen
                | EventKind::Open
                | EventKind::PreClose
                | EventKind::Close
                | EventKind::LifecycleFailed
        )
    }
}
