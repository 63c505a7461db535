//! # LogWriter: event renderer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  [preopen] component="workers"
//! INFO  [open] component="workers"
//! DEBUG [worker-spawned] component="workers" worker=1
//! WARN  [job-timeout] component="workers" worker=1 request=7 job=scrypt timeout_ms=500
//! WARN  [job-retried] component="workers" job=scrypt attempt=2 reason="timeout"
//! ERROR [lifecycle-failed] component="chain" reason="open failed: db locked"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::PreOpen => info!(component, "[preopen]"),
            EventKind::Open => info!(component, "[open]"),
            EventKind::PreClose => info!(component, "[preclose]"),
            EventKind::Close => info!(component, "[close]"),
            EventKind::LifecycleFailed => error!(component, reason, "[lifecycle-failed]"),
            EventKind::WorkerSpawned => debug!(component, worker = ?e.worker, "[worker-spawned]"),
            EventKind::WorkerExited => {
                debug!(component, worker = ?e.worker, reason, "[worker-exited]")
            }
            EventKind::JobDispatched => debug!(
                component,
                worker = ?e.worker,
                request = ?e.request,
                job = ?e.job,
                attempt = ?e.attempt,
                "[job-dispatched]"
            ),
            EventKind::JobTimedOut => warn!(
                component,
                worker = ?e.worker,
                request = ?e.request,
                job = ?e.job,
                timeout_ms = ?e.timeout_ms,
                "[job-timeout]"
            ),
            EventKind::WorkerCrashed => warn!(
                component,
                worker = ?e.worker,
                request = ?e.request,
                job = ?e.job,
                reason,
                "[worker-crashed]"
            ),
            EventKind::JobRetried => {
                warn!(component, job = ?e.job, attempt = ?e.attempt, reason, "[job-retried]")
            }
            EventKind::ResponseDiscarded => warn!(
                component,
                worker = ?e.worker,
                request = ?e.request,
                "[response-discarded]"
            ),
            EventKind::AllStoppedWithin => info!(component, "[all-stopped-within-grace]"),
            EventKind::GraceExceeded => warn!(component, reason, "[grace-exceeded]"),
            EventKind::SubscriberOverflow => {
                warn!(subscriber = component, reason, "[subscriber-overflow]")
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = component, reason, "[subscriber-panicked]")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
