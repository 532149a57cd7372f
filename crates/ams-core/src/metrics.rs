//! Metric payload types.
//!
//! A metric set is a flat mapping from metric name (`memtotal`, `entitled`,
//! ...) to a value. Values are kilobytes or counters as produced by the
//! provider; this module attaches no meaning to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single metric value.
///
/// Serialized untagged: integers and strings appear as themselves, an
/// absent value (e.g. `memloaned` on a kernel without CMM) as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Text(String),
    Absent,
}

impl MetricValue {
    /// Returns the integer value, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MetricValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<Option<i64>> for MetricValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(MetricValue::Absent, MetricValue::Integer)
    }
}

/// Named metric values for one subject (the system, the bus, a device).
pub type Metrics = BTreeMap<String, MetricValue>;

/// Per-device metrics keyed by device name.
pub type DeviceMetrics = BTreeMap<String, Metrics>;

/// System, bus and device metrics, in that order.
pub type AllData = (Metrics, Metrics, DeviceMetrics);

/// What a successful request carries back to the client.
///
/// Serialized untagged: `AllData` is a three-element array, `SystemData`
/// a single object. The two shapes cannot be confused when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    AllData(Metrics, Metrics, DeviceMetrics),
    SystemData(Metrics),
}

impl Payload {
    /// Returns the system metrics, which every payload carries.
    pub fn system(&self) -> &Metrics {
        match self {
            Payload::AllData(system, _, _) => system,
            Payload::SystemData(system) => system,
        }
    }

    /// Returns the bus metrics, if present.
    pub fn bus(&self) -> Option<&Metrics> {
        match self {
            Payload::AllData(_, bus, _) => Some(bus),
            Payload::SystemData(_) => None,
        }
    }

    /// Returns the device metrics, if present.
    pub fn devices(&self) -> Option<&DeviceMetrics> {
        match self {
            Payload::AllData(_, _, devices) => Some(devices),
            Payload::SystemData(_) => None,
        }
    }

    /// Number of top-level data objects, as logged by the server.
    pub fn object_count(&self) -> usize {
        match self {
            Payload::AllData(..) => 3,
            Payload::SystemData(system) => system.len(),
        }
    }
}

impl From<AllData> for Payload {
    fn from((system, bus, devices): AllData) -> Self {
        Payload::AllData(system, bus, devices)
    }
}
