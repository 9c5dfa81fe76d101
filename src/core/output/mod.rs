//! Per-problem CSV reports.

use std::path::Path;

use crate::Result;

pub mod csv;
pub use self::csv::ProblemReport;

pub const HEADER: [&str; 5] = ["Rep", "Total_uJ", "Function", "Percent", "Func_uJ"];

/// Written on the profiled repetition when perf attributed nothing.
pub const NONE_DETECTED: &str = "NONE_DETECTED";
/// Written on the profiled repetition when callgrind attributed nothing.
pub const TIMEOUT_OR_NONE: &str = "TIMEOUT_OR_NONE";
/// Whole-run row of a clean repetition.
pub const PHASE_TOTAL: &str = "PHASE_TOTAL";

/// One line of a problem report.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub rep: u32,
    pub total_uj: u64,
    pub function: String,
    pub percent: f64,
    pub func_uj: f64,
}

impl MeasurementRow {
    /// A tracked function's share of a profiled run.
    pub fn attributed(rep: u32, total_uj: u64, function: &str, percent: f64) -> Self {
        Self {
            rep,
            total_uj,
            function: function.to_string(),
            percent,
            func_uj: percent / 100.0 * total_uj as f64,
        }
    }

    /// A profiled run where no tracked function was found.
    pub fn unattributed(rep: u32, total_uj: u64, sentinel: &str) -> Self {
        Self {
            rep,
            total_uj,
            function: sentinel.to_string(),
            percent: 0.0,
            func_uj: 0.0,
        }
    }

    /// A clean run, the whole energy attributed to the run itself.
    pub fn phase_total(rep: u32, total_uj: u64) -> Self {
        Self {
            rep,
            total_uj,
            function: PHASE_TOTAL.to_string(),
            percent: 100.0,
            func_uj: total_uj as f64,
        }
    }

    pub fn to_record(&self) -> [String; 5] {
        [
            self.rep.to_string(),
            self.total_uj.to_string(),
            self.function.clone(),
            self.percent.to_string(),
            self.func_uj.to_string(),
        ]
    }
}

pub fn ensure_output_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributed_share() {
        let row = MeasurementRow::attributed(1, 2_000, "solve", 25.0);
        assert_eq!(row.func_uj, 500.0);
        assert_eq!(row.to_record(), ["1", "2000", "solve", "25", "500"]);
    }

    #[test]
    fn test_sentinel_rows() {
        assert_eq!(
            MeasurementRow::unattributed(1, 42, NONE_DETECTED).to_record(),
            ["1", "42", "NONE_DETECTED", "0", "0"]
        );
        assert_eq!(
            MeasurementRow::phase_total(3, 900).to_record(),
            ["3", "900", "PHASE_TOTAL", "100", "900"]
        );
    }
}
