//! Worker-executable jobs.
//!
//! - [`Job`], [`JobOutput`] the serializable job set and its results
//! - [`JobRegistry`] resolves and runs a job
//! - [`TransactionBackend`] the injected script engine for transaction jobs
//! - [`crypto`] the pure functions behind `ecVerify`, `ecSign`, `mine`, `scrypt`

mod backend;
pub mod crypto;
mod job;
mod registry;

pub use backend::TransactionBackend;
pub use job::{InputSignature, JOB_NAMES, Job, JobOutput, KeyRing, SignedInputs};
pub use registry::JobRegistry;
