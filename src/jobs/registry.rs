//! # JobRegistry: name → function catalog executed inside workers.
//!
//! ```text
//! JobRequest { id, job } ──► JobRegistry::execute(job)
//!                                ├─ verify / verifyInput / sign / signInput ──► TransactionBackend
//!                                ├─ ecVerify / ecSign                       ──► secp256k1
//!                                ├─ mine                                    ──► sha256d search
//!                                └─ scrypt                                  ──► scrypt
//! ```
//!
//! `execute` never panics on bad input: malformed arguments come back as a
//! failure description that the coordinator surfaces as `JobError::Failed`.

use std::sync::Arc;

use crate::jobs::backend::TransactionBackend;
use crate::jobs::crypto;
use crate::jobs::job::{Job, JobOutput};

/// Fixed catalog of worker-executable functions.
#[derive(Clone, Default)]
pub struct JobRegistry {
    backend: Option<Arc<dyn TransactionBackend>>,
}

impl JobRegistry {
    /// Creates a registry without a transaction backend.
    ///
    /// Transaction jobs fail until one is installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the transaction backend.
    pub fn with_backend(mut self, backend: Arc<dyn TransactionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// True when transaction jobs can run.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Runs one job to completion on the current thread.
    pub fn execute(&self, job: Job) -> Result<JobOutput, String> {
        self.execute_until(job, &|| false)
    }

    /// Like [`execute`](Self::execute), but long searches give up once `stop` returns `true`.
    pub fn execute_until(&self, job: Job, stop: &dyn Fn() -> bool) -> Result<JobOutput, String> {
        let name = job.name();
        match job {
            Job::Verify { tx, flags } => self
                .backend(name)?
                .verify(&tx, flags)
                .map(JobOutput::Bool)
                .map_err(|e| format!("{e:#}")),
            Job::VerifyInput { tx, index, flags } => self
                .backend(name)?
                .verify_input(&tx, index, flags)
                .map(JobOutput::Bool)
                .map_err(|e| format!("{e:#}")),
            Job::Sign { tx, rings, sighash } => self
                .backend(name)?
                .sign(&tx, &rings, sighash)
                .map(JobOutput::Signed)
                .map_err(|e| format!("{e:#}")),
            Job::SignInput {
                tx,
                index,
                key,
                sighash,
            } => self
                .backend(name)?
                .sign_input(&tx, index, &key, sighash)
                .map(JobOutput::InputSigned)
                .map_err(|e| format!("{e:#}")),
            Job::EcVerify { msg, sig, key } => Ok(JobOutput::Bool(crypto::ec_verify(&msg, &sig, &key))),
            Job::EcSign { msg, key } => crypto::ec_sign(&msg, &key)
                .map(JobOutput::Signature)
                .map_err(|e| e.to_string()),
            Job::Mine {
                header,
                target,
                start,
                end,
            } => crypto::mine_until(&header, &target, start, end, stop).map(JobOutput::Nonce),
            Job::Scrypt {
                passwd,
                salt,
                n,
                r,
                p,
                len,
            } => crypto::scrypt(&passwd, &salt, n, r, p, len).map(JobOutput::Key),
        }
    }

    fn backend(&self, job: &'static str) -> Result<&dyn TransactionBackend, String> {
        self.backend
            .as_deref()
            .ok_or_else(|| format!("{job}: no transaction backend installed"))
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("backend", &self.backend.is_some())
            .finish()
    }
}
