//! Worker units and the protocol they speak.
//!
//! - [`protocol`] request/response frames correlated by id
//! - [`Spawn`], [`WorkerChannel`], [`WorkerEvent`] the coordinator's view of a worker
//! - [`ThreadSpawner`] in-process thread workers
//! - [`ProcessSpawner`] child-process workers
//! - [`serve`], [`serve_stdio`] the worker-side loop

mod channel;
mod process;
pub mod protocol;
mod serve;
mod thread;

pub use channel::{Spawn, WorkerChannel, WorkerEvent};
pub use process::{NETWORK_ENV, ProcessSpawner, WORKER_ID_ENV};
pub use serve::{serve, serve_stdio};
pub use thread::ThreadSpawner;
