//! AMS Core - Shared types for Active Memory Sharing monitoring
//!
//! This crate provides the metric payload types exchanged between the
//! data server (amsd) and its clients, the `DataProvider` capability the
//! server dispatches to, and a provider backed by `/proc` and `/sys`.
//!
//! The protocol layers treat metric values as opaque: nothing outside a
//! provider interprets them.

pub mod error;
pub mod metrics;
pub mod provider;
pub mod sysfs;

// Re-exports for convenience
pub use error::{GatherError, GatherResult};
pub use metrics::{AllData, DeviceMetrics, MetricValue, Metrics, Payload};
pub use provider::DataProvider;
pub use sysfs::SysfsProvider;
