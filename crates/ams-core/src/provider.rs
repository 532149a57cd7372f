//! The capability the data server dispatches commands to.

use crate::error::GatherResult;
use crate::metrics::{AllData, Metrics};

/// Source of AMS metric snapshots.
///
/// Implementations gather a fresh snapshot on every call. They report
/// failure through `GatherError`; they must not panic for ordinary I/O
/// problems, since a panic takes the whole server down.
pub trait DataProvider: Send + Sync {
    /// Gathers the system, bus and per-device metrics together.
    fn gather_all_data(&self) -> GatherResult<AllData>;

    /// Gathers only the system memory metrics.
    fn gather_system_data(&self) -> GatherResult<Metrics>;
}
