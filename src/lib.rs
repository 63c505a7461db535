//! # workvisor
//!
//! **Workvisor** supervises the long-lived subsystems of a node and offloads
//! its CPU-bound work to isolated worker units.
//!
//! It provides two primitives:
//! - a **lifecycle contract** ([`Component`] + [`LifecycleController`]) that
//!   serializes open/close transitions, coalesces concurrent callers and
//!   rejects contradictory ones;
//! - a **worker pool** ([`WorkerPool`]) that runs a fixed set of jobs
//!   (transaction verification and signing, ECDSA, block-header mining,
//!   scrypt) on threads or child processes, with timeouts, one retry on a
//!   replacement worker, and response correlation by request id.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    chain     │   │   mempool    │   │  WorkerPool  │
//!     │ (Component)  │   │ (Component)  │   │ (Component)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────────────────────────────────────────────┐
//!     │ LifecycleController (one per component)              │
//!     │  - ExclusivityLock (FIFO, held for the whole hook)   │
//!     │  - waiters settled together, in registration order   │
//!     │  - Observe callbacks + Bus events                    │
//!     └──────────────────────────┬───────────────────────────┘
//!                                │ publish(Event)
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                  (capacity: Config::bus_capacity)                 │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │     (in Context)       │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                           (per-sub queues)
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                    LogWriter   metrics    custom
//! ```
//!
//! ### Job path
//! ```text
//! WorkerPool::ec_verify(msg, sig, key)
//!   ├─► SigCache hit? ─► Ok(true)
//!   └─► execute(Job::EcVerify)
//!         ├─ use_workers = false ─► spawn_blocking(JobRegistry::execute)
//!         └─ Dispatcher
//!              ├─► idle worker, or spawn one (≤ max_workers), or queue (FIFO)
//!              ├─► JobRequest { id, job } ──► worker ──► JobResponse { id, outcome }
//!              ├─► timeout ─► kill worker ─► retry once on another worker
//!              └─► crash   ─► retry once on another worker
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Lifecycle**     | Open/close state machine with coalesced callers.          | [`Component`], [`LifecycleController`]      |
//! | **Workers**       | Offload jobs to threads or child processes.               | [`WorkerPool`], [`Spawn`], [`ProcessSpawner`] |
//! | **Jobs**          | Fixed catalog of CPU-bound functions.                     | [`Job`], [`JobRegistry`], [`TransactionBackend`] |
//! | **Subscriber API**| Hook into lifecycle and worker events.                    | [`Subscribe`], [`Observe`]                  |
//! | **Errors**        | Typed errors for transitions, jobs and the worker loop.   | [`LifecycleError`], [`JobError`], [`WorkerError`] |
//! | **Configuration** | Centralized settings overlaid once at startup.            | [`Config`], [`Options`]                     |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//! - `test-utils`: exports scripted worker doubles in [`test_utils`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use workvisor::{Config, Context, Options};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.set(Options { workers_size: Some(2), ..Options::default() });
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn workvisor::Subscribe>> = vec![Arc::new(workvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn workvisor::Subscribe>> = Vec::new();
//!
//!     let ctx = Context::builder(cfg).with_subscribers(subs).build();
//!     let pool = ctx.pool();
//!
//!     pool.open().await?;
//!     let key = pool.scrypt(b"pass".to_vec(), b"NaCl".to_vec(), 16, 8, 1, 32).await?;
//!     assert_eq!(key.len(), 32);
//!
//!     ctx.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
pub mod jobs;
mod lifecycle;
mod sigcache;
mod subscribers;
pub mod worker;

// ---- Public re-exports ----

pub use config::{Config, Network, Options};
pub use crate::core::{Context, ContextBuilder, POOL_NAME, WorkerPool};
pub use error::{JobError, LifecycleError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{InputSignature, Job, JobOutput, JobRegistry, KeyRing, SignedInputs, TransactionBackend};
pub use lifecycle::{
    Component, ExclusivityLock, LifecycleController, LifecycleEvent, LifecycleState, Observe,
    ReleaseGuard,
};
pub use sigcache::SigCache;
pub use subscribers::{Subscribe, SubscriberSet};
pub use worker::{ProcessSpawner, Spawn, ThreadSpawner, WorkerChannel, WorkerEvent};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

// Optional: scripted doubles for tests.
// Enable with: `--features test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
