//! Test utilities and scripted implementations.
//!
//! Reusable fakes for the two seams of the crate: the transaction backend
//! behind the registry, and the transport behind the worker pool.

pub mod mocks;
pub mod spawner;

pub use mocks::StubBackend;
pub use spawner::{Behavior, ScriptedSpawner};
