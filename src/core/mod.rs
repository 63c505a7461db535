//! Runtime core: the worker pool and the context that owns it.
//!
//! Public API from this module is [`Context`], [`ContextBuilder`] and [`WorkerPool`].
//!
//! Internal modules:
//! - [`dispatcher`]: single actor owning workers, queue, timers and request ids;
//! - [`handle`]: per-worker and per-request bookkeeping;
//! - [`pool`]: lifecycle-managed pool handle and typed job helpers;
//! - [`context`], [`builder`]: event plumbing and assembly;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod context;
mod dispatcher;
mod handle;
mod pool;
mod shutdown;

pub use builder::ContextBuilder;
pub use context::Context;
pub use pool::{POOL_NAME, WorkerPool};
