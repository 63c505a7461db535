//! Error types used by the lifecycle controller, the worker pool and workers.
//!
//! This module defines three error enums:
//!
//! - [`LifecycleError`]: failures of an open/close transition.
//! - [`JobError`]: failures of a single [`WorkerPool::execute`](crate::WorkerPool::execute) call.
//! - [`WorkerError`]: failures of the worker-side serve loop.
//!
//! All of them provide `as_label` (stable snake_case for logs/metrics).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by lifecycle transitions.
///
/// Cloneable: one transition outcome is delivered to every waiter.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    /// Opposite transition requested while another one is in flight.
    #[error("{component}: {reason}")]
    Usage {
        /// Component name.
        component: String,
        /// What the caller did wrong.
        reason: &'static str,
    },

    /// The `on_open` hook failed; the component is back to `Idle`.
    #[error("{component}: open failed: {error:#}")]
    OpenFailed {
        /// Component name.
        component: String,
        /// The original hook error.
        error: Arc<anyhow::Error>,
    },

    /// The `on_close` hook failed; the component is back to `Open`.
    #[error("{component}: close failed: {error:#}")]
    CloseFailed {
        /// Component name.
        component: String,
        /// The original hook error.
        error: Arc<anyhow::Error>,
    },

    /// The transition task went away without settling (runtime shutting down).
    #[error("{component}: transition abandoned")]
    Abandoned {
        /// Component name.
        component: String,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use workvisor::LifecycleError;
    ///
    /// let err = LifecycleError::Usage { component: "chain".into(), reason: "cannot open while closing" };
    /// assert_eq!(err.as_label(), "lifecycle_usage");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::Usage { .. } => "lifecycle_usage",
            LifecycleError::OpenFailed { .. } => "lifecycle_open_failed",
            LifecycleError::CloseFailed { .. } => "lifecycle_close_failed",
            LifecycleError::Abandoned { .. } => "lifecycle_abandoned",
        }
    }

    /// True for caller mistakes (never worth retrying).
    pub fn is_usage(&self) -> bool {
        matches!(self, LifecycleError::Usage { .. })
    }

    /// Returns the hook error, if the transition failed inside a hook.
    pub fn hook_error(&self) -> Option<&anyhow::Error> {
        match self {
            LifecycleError::OpenFailed { error, .. } | LifecycleError::CloseFailed { error, .. } => {
                Some(error.as_ref())
            }
            _ => None,
        }
    }
}

/// # Errors produced by job execution.
///
/// `Timeout` and `Crashed` are only returned after the single retry on a
/// replacement worker was spent; they are distinguishable from a job that
/// legitimately produced "no result" (e.g. `mine` returning `None`).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The pool is not open.
    #[error("worker pool is not open")]
    NotOpen,

    /// The pool closed before the job settled.
    #[error("worker pool closed")]
    Closed,

    /// No response within the worker timeout, on every attempt.
    #[error("job timed out after {timeout:?} ({attempts} attempts)")]
    Timeout {
        /// Per-attempt timeout.
        timeout: Duration,
        /// Attempts made (including the retry).
        attempts: u32,
    },

    /// The worker exited while holding the job, on every attempt.
    #[error("worker crashed: {reason} ({attempts} attempts)")]
    Crashed {
        /// Last observed exit reason.
        reason: String,
        /// Attempts made (including the retry).
        attempts: u32,
    },

    /// The job ran and reported a failure.
    #[error("{job} failed: {message}")]
    Failed {
        /// Job name.
        job: &'static str,
        /// Failure description from the worker.
        message: String,
    },

    /// A worker could not be started.
    #[error("failed to spawn worker: {reason}")]
    Spawn {
        /// Underlying spawn error.
        reason: String,
    },

    /// The job produced an output of the wrong shape.
    #[error("{job}: unexpected output")]
    UnexpectedOutput {
        /// Job name.
        job: &'static str,
    },
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use workvisor::JobError;
    /// use std::time::Duration;
    ///
    /// let err = JobError::Timeout { timeout: Duration::from_secs(1), attempts: 2 };
    /// assert_eq!(err.as_label(), "job_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::NotOpen => "job_not_open",
            JobError::Closed => "job_closed",
            JobError::Timeout { .. } => "job_timeout",
            JobError::Crashed { .. } => "job_crashed",
            JobError::Failed { .. } => "job_failed",
            JobError::Spawn { .. } => "job_spawn",
            JobError::UnexpectedOutput { .. } => "job_unexpected_output",
        }
    }

    /// Indicates whether the failure came from the worker unit rather than the job.
    ///
    /// Returns `true` for [`JobError::Timeout`] and [`JobError::Crashed`].
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, JobError::Timeout { .. } | JobError::Crashed { .. })
    }
}

/// # Errors produced by the worker-side serve loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Reading or writing a frame failed.
    #[error("worker io: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("worker codec: {0}")]
    Codec(#[from] bincode::Error),

    /// A job panicked; the worker stops serving.
    #[error("job {job} panicked")]
    JobPanicked {
        /// Job name.
        job: &'static str,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Io(_) => "worker_io",
            WorkerError::Codec(_) => "worker_codec",
            WorkerError::JobPanicked { .. } => "worker_job_panicked",
        }
    }
}
