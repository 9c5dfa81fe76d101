//! Package energy readings from the Linux powercap (RAPL) interface.
//!
//! A [`MeasurementSession`] mutably borrows its [`EnergyMeter`] for the whole
//! measured interval, so two sessions can never overlap.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::core::Result;

const ZONE_PREFIX: &str = "intel-rapl:";

#[derive(Debug, Clone)]
struct PackageCounter {
    energy_path: PathBuf,
    max_range_uj: Option<u64>,
}

impl PackageCounter {
    fn read(&self) -> Option<u64> {
        read_counter(&self.energy_path)
    }

    /// Energy consumed between two readings, accounting for a single wrap.
    fn delta(&self, start: u64, end: u64) -> u64 {
        if end >= start {
            return end - start;
        }

        match self.max_range_uj {
            Some(max) => max.saturating_sub(start).saturating_add(end),
            None => {
                tracing::warn!(
                    "Energy counter {} wrapped without a known range, dropping reading",
                    self.energy_path.display()
                );
                0
            }
        }
    }
}

/// The set of package-level energy counters on this machine.
#[derive(Debug, Default)]
pub struct EnergyMeter {
    counters: Vec<PackageCounter>,
}

impl EnergyMeter {
    /// Find every readable package counter under `root` (normally
    /// `/sys/class/powercap`). Subzones such as `intel-rapl:0:1` are skipped.
    pub fn discover(root: &Path) -> Result<Self> {
        let pattern = format!(
            "{}/{ZONE_PREFIX}*/energy_uj",
            glob::Pattern::escape(&root.to_string_lossy())
        );

        let mut counters = Vec::new();
        for entry in glob::glob(&pattern)? {
            let energy_path = entry?;
            let Some(zone) = energy_path
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
            else {
                continue;
            };

            let is_package = zone
                .strip_prefix(ZONE_PREFIX)
                .is_some_and(|index| !index.contains(':'));
            if !is_package {
                continue;
            }

            if read_counter(&energy_path).is_none() {
                tracing::debug!("Energy counter {} is not readable", energy_path.display());
                continue;
            }

            let max_range_uj = energy_path
                .parent()
                .and_then(|zone_dir| read_counter(&zone_dir.join("max_energy_range_uj")));

            tracing::debug!("Using energy counter: {}", energy_path.display());
            counters.push(PackageCounter {
                energy_path,
                max_range_uj,
            });
        }

        counters.sort_by(|a, b| a.energy_path.cmp(&b.energy_path));

        Ok(Self { counters })
    }

    /// A meter that always reports zero.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        !self.counters.is_empty()
    }

    pub fn package_count(&self) -> usize {
        self.counters.len()
    }

    /// Take the starting readings. Call as close to the measured work as
    /// possible.
    pub fn begin(&mut self) -> MeasurementSession<'_> {
        let start = self.counters.iter().map(PackageCounter::read).collect();
        MeasurementSession { meter: self, start }
    }
}

/// One measured interval. Consumed by [`MeasurementSession::end`].
#[derive(Debug)]
pub struct MeasurementSession<'a> {
    meter: &'a mut EnergyMeter,
    start: Vec<Option<u64>>,
}

impl MeasurementSession<'_> {
    /// Close the interval and return the microjoules consumed by all packages.
    pub fn end(self) -> u64 {
        self.meter
            .counters
            .iter()
            .zip(self.start)
            .map(|(counter, start)| match (start, counter.read()) {
                (Some(start), Some(end)) => counter.delta(start, end),
                _ => 0,
            })
            .fold(0u64, u64::saturating_add)
    }
}

fn read_counter(path: &Path) -> Option<u64> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_zone(root: &Path, zone: &str, energy: u64, max: Option<u64>) {
        let dir = root.join(zone);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("energy_uj"), format!("{energy}\n")).unwrap();
        if let Some(max) = max {
            fs::write(dir.join("max_energy_range_uj"), format!("{max}\n")).unwrap();
        }
    }

    #[test]
    fn test_discover_only_packages() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "intel-rapl:0", 100, None);
        write_zone(root.path(), "intel-rapl:0:0", 50, None);
        write_zone(root.path(), "intel-rapl:1", 100, None);
        write_zone(root.path(), "intel-rapl-mmio:0", 100, None);

        let meter = EnergyMeter::discover(root.path()).unwrap();
        assert_eq!(meter.package_count(), 2);
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let root = TempDir::new().unwrap();
        let meter = EnergyMeter::discover(&root.path().join("powercap")).unwrap();
        assert!(!meter.is_available());
    }

    #[test]
    fn test_session_sums_package_deltas() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "intel-rapl:0", 1_000, None);
        write_zone(root.path(), "intel-rapl:0:0", 10, None);
        write_zone(root.path(), "intel-rapl:1", 2_000, None);

        let mut meter = EnergyMeter::discover(root.path()).unwrap();
        let session = meter.begin();
        write_zone(root.path(), "intel-rapl:0", 1_500, None);
        write_zone(root.path(), "intel-rapl:0:0", 9_999, None);
        write_zone(root.path(), "intel-rapl:1", 2_250, None);

        assert_eq!(session.end(), 750);
    }

    #[test]
    fn test_session_handles_wrap() {
        let root = TempDir::new().unwrap();
        write_zone(root.path(), "intel-rapl:0", 990, Some(1_000));

        let mut meter = EnergyMeter::discover(root.path()).unwrap();
        let session = meter.begin();
        write_zone(root.path(), "intel-rapl:0", 15, Some(1_000));

        assert_eq!(session.end(), 25);
    }

    #[test]
    fn test_unavailable_meter_reports_zero() {
        let mut meter = EnergyMeter::unavailable();
        assert_eq!(meter.begin().end(), 0);
    }
}
