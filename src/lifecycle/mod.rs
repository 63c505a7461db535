//! Lifecycle contract for long-lived components.
//!
//! - [`ExclusivityLock`] FIFO mutual exclusion with a release-on-drop guard
//! - [`Component`] the required open/close hooks
//! - [`LifecycleController`] the Idle/Opening/Open/Closing state machine
//! - [`Observe`] synchronous observers of transition notifications

mod controller;
mod lock;

pub use controller::{Component, LifecycleController, LifecycleEvent, LifecycleState, Observe};
pub use lock::{ExclusivityLock, ReleaseGuard};
