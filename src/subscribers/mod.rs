//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Controller / Dispatcher ── publish(Event) ──► Bus ──► Context listener
//!                                                           │
//!                                                  SubscriberSet::emit(&Event)
//!                                                ┌──────────┼──────────┐
//!                                                ▼          ▼          ▼
//!                                            LogWriter   Metrics    Custom
//! ```

mod embedded;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
