//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timing.
//!
//! ## Components
//! - **Logging**: Subscriber setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: Per-instance observability counters
//! - **Time**: Wall-clock freshness buckets
//! - **Timeout**: Async timeout wrappers and defaults

pub mod logging;
pub mod metrics;
pub mod time;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
