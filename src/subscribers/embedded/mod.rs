//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events through `tracing`.

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
