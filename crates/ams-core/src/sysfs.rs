//! Provider reading AMS metrics from `/proc` and `/sys`.
//!
//! Sources, relative to the provider root:
//!
//! | File | Metrics |
//! |------|---------|
//! | `proc/meminfo` | memtotal, memfree, buffers, cached (kB) |
//! | `proc/ppc64/lparcfg` | faults, faulttime |
//! | `sys/devices/system/cmm/cmm0/loaned_kb` | memloaned (optional) |
//! | `sys/bus/vio/cmo_*` | bus entitlement pool (bytes, reported in kB) |
//! | `sys/bus/vio/devices/*/cmo_*` | per-device entitlement (bytes, reported in kB) |

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{GatherError, GatherResult};
use crate::metrics::{AllData, DeviceMetrics, MetricValue, Metrics};
use crate::provider::DataProvider;

const MEMINFO: &str = "proc/meminfo";
const LPARCFG: &str = "proc/ppc64/lparcfg";
const CMM_LOANED: &str = "sys/devices/system/cmm/cmm0/loaned_kb";
const VIO_BUS: &str = "sys/bus/vio";
const VIO_DEVICES: &str = "sys/bus/vio/devices";

/// (file key, metric name)
const MEMINFO_PARAMS: &[(&str, &str)] = &[
    ("MemTotal", "memtotal"),
    ("MemFree", "memfree"),
    ("Buffers", "buffers"),
    ("Cached", "cached"),
];

const LPARCFG_PARAMS: &[(&str, &str)] = &[
    ("cmo_faults", "faults"),
    ("cmo_fault_time_usec", "faulttime"),
];

const BUS_PARAMS: &[(&str, &str)] = &[
    ("cmo_entitled", "entitled"),
    ("cmo_min", "min"),
    ("cmo_desired", "desired"),
    ("cmo_curr", "curr"),
    ("cmo_reserve_size", "reserve"),
    ("cmo_excess_size", "excess"),
    ("cmo_excess_free", "excessfree"),
    ("cmo_high", "high"),
    ("cmo_spare", "spare"),
];

const DEVICE_PARAMS: &[(&str, &str)] = &[
    ("cmo_desired", "desired"),
    ("cmo_entitled", "entitled"),
    ("cmo_allocated", "allocated"),
    ("cmo_allocs_failed", "allocs_failed"),
];

/// Device metrics reported in bytes by sysfs and converted to kB.
const DEVICE_BYTE_METRICS: &[&str] = &["desired", "entitled", "allocated"];

/// Directory under the devices path that is the bus itself, not a device.
const BUS_SELF_ENTRY: &str = "vio";

/// Reads AMS data from the live system, or from a copy of its
/// pseudo-filesystems rooted elsewhere.
#[derive(Debug, Clone)]
pub struct SysfsProvider {
    root: PathBuf,
}

impl SysfsProvider {
    /// Creates a provider reading the running system.
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Creates a provider reading `proc/` and `sys/` under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// System memory usage statistics.
    pub fn system_data(&self) -> GatherResult<Metrics> {
        let mut data = Metrics::new();

        let meminfo = self.path(MEMINFO);
        read_key_values(&meminfo, MEMINFO_PARAMS, ':', " kB", &mut data).map_err(|e| {
            error!(error = %e, "Unable to gather system data (meminfo)");
            e
        })?;

        read_key_values(&self.path(LPARCFG), LPARCFG_PARAMS, '=', "", &mut data).map_err(|e| {
            error!(error = %e, "Unable to gather system data (lparcfg)");
            e
        })?;

        let field = |name: &str| {
            data.get(name)
                .and_then(MetricValue::as_integer)
                .ok_or_else(|| GatherError::MissingField {
                    path: meminfo.clone(),
                    field: name.to_string(),
                })
        };
        let memtotal = field("memtotal")?;
        let memused = memtotal - field("memfree")? - field("buffers")? - field("cached")?;
        data.insert("memused".to_string(), memused.into());

        let loaned = match read_single_value(&self.path(CMM_LOANED)) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(error = %e, "CMM loaned memory not available");
                None
            }
        };
        data.insert("memloaned".to_string(), loaned.into());
        if let Some(loaned) = loaned {
            data.insert("memtotal".to_string(), (memtotal + loaned).into());
        }

        Ok(data)
    }

    /// VIO bus entitlement pool, in kB.
    pub fn bus_data(&self) -> GatherResult<Metrics> {
        let bus = self.path(VIO_BUS);
        let mut data = Metrics::new();

        for (file, name) in BUS_PARAMS {
            let value = read_single_value(&bus.join(file)).map_err(|e| {
                error!(error = %e, "Error collecting AMS bus data, is the kernel enabled for this feature?");
                e
            })?;
            data.insert((*name).to_string(), (value / 1024).into());
        }

        Ok(data)
    }

    /// Entitlement data for every device on the VIO bus, in kB.
    ///
    /// Devices that cannot be read, or hold no entitlement, are left out.
    pub fn device_data(&self) -> GatherResult<DeviceMetrics> {
        let dev_path = self.path(VIO_DEVICES);
        let entries = fs::read_dir(&dev_path).map_err(|e| {
            error!(
                path = %dev_path.display(),
                error = %e,
                "Error discovering devices on the virtual IO bus"
            );
            GatherError::Read {
                path: dev_path.clone(),
                error: e.to_string(),
            }
        })?;

        let mut devices = DeviceMetrics::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();
            if name == BUS_SELF_ENTRY || !dir.is_dir() {
                continue;
            }

            match read_device(&dir, &name) {
                Ok(Some(metrics)) => {
                    devices.insert(name, metrics);
                }
                Ok(None) => {
                    debug!(device = %name, "VIO device holds no entitlement");
                }
                Err(e) => {
                    warn!(device = %name, error = %e, "Skipping unreadable VIO device");
                }
            }
        }

        Ok(devices)
    }
}

impl Default for SysfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for SysfsProvider {
    fn gather_all_data(&self) -> GatherResult<AllData> {
        let system = self.system_data()?;
        let bus = self.bus_data()?;
        let mut devices = self.device_data()?;

        // Devices are reported together with how much of the excess pool
        // is in use, as computed from the bus.
        let bus_value = |name: &str| bus.get(name).and_then(MetricValue::as_integer).unwrap_or(0);
        let excess = bus_value("excess");
        let excess_used = excess - bus_value("excessfree");

        for metrics in devices.values_mut() {
            let entitled = metrics
                .get("entitled")
                .and_then(MetricValue::as_integer)
                .unwrap_or(0);
            metrics.insert("excess_used".to_string(), excess_used.into());
            metrics.insert("maxavail".to_string(), (excess + entitled).into());
        }

        Ok((system, bus, devices))
    }

    fn gather_system_data(&self) -> GatherResult<Metrics> {
        self.system_data()
    }
}

/// Reads one device, or `None` if its entitlement is zero bytes.
///
/// The entitlement is tested in bytes, so a device entitled to less than
/// 1 kB is kept and reported with `entitled = 0`.
fn read_device(dir: &Path, name: &str) -> GatherResult<Option<Metrics>> {
    let mut metrics = Metrics::new();
    metrics.insert("name".to_string(), name.into());

    for (file, metric) in DEVICE_PARAMS {
        let mut value = read_single_value(&dir.join(file))?;
        if *metric == "entitled" && value == 0 {
            return Ok(None);
        }
        if DEVICE_BYTE_METRICS.contains(metric) {
            value /= 1024;
        }
        metrics.insert((*metric).to_string(), value.into());
    }

    Ok(Some(metrics))
}

fn read_to_string(path: &Path) -> GatherResult<String> {
    fs::read_to_string(path).map_err(|e| GatherError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

fn parse_value(path: &Path, field: &str, raw: &str) -> GatherResult<i64> {
    raw.parse::<i64>().map_err(|_| GatherError::Parse {
        path: path.to_path_buf(),
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Reads `key<separator>value` lines, storing the keys listed in `params`
/// into `into` under their metric names.
fn read_key_values(
    path: &Path,
    params: &[(&str, &str)],
    separator: char,
    suffix: &str,
    into: &mut Metrics,
) -> GatherResult<()> {
    let contents = read_to_string(path)?;

    for line in contents.lines() {
        let Some((key, raw)) = line.split_once(separator) else {
            continue;
        };
        let Some((_, metric)) = params.iter().find(|(k, _)| *k == key) else {
            continue;
        };
        let raw = raw.trim();
        let raw = raw.strip_suffix(suffix.trim_start()).unwrap_or(raw).trim();
        into.insert((*metric).to_string(), parse_value(path, key, raw)?.into());
    }

    Ok(())
}

/// Reads a file holding a single integer.
fn read_single_value(path: &Path) -> GatherResult<i64> {
    let contents = read_to_string(path)?;
    let raw = contents.lines().next().unwrap_or("").trim();
    let field = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_value(path, &field, raw)
}
