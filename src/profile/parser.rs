//! Scraping attribution out of profiler text output.
//!
//! Both parsers are pure: they take the raw report text and never touch the
//! tools themselves.

use regex::Regex;
use std::sync::LazyLock;

use crate::{core::utils::contains_ignore_case, profile::functions::TrackedFunctions};

/// Lines of a perf report kept for diagnostics when nothing tracked matched.
pub const TOP_SYMBOL_LINES: usize = 10;

static PERCENT_RX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)%").unwrap());
static PROGRAM_TOTALS_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d,]+)\s+\(100\.0%\)\s+PROGRAM TOTALS").unwrap());
static LEADING_COUNT_RX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*([\d,]+)").unwrap());

/// Percentage of the profiled run attributed to each tracked fragment, in the
/// order fragments were first matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribution {
    entries: Vec<(String, f64)>,
}

impl Attribution {
    /// Accumulate `percent` onto `fragment`.
    pub fn add(&mut self, fragment: &str, percent: f64) {
        match self.entries.iter_mut().find(|(name, _)| name == fragment) {
            Some((_, total)) => *total += percent,
            None => self.entries.push((fragment.to_string(), percent)),
        }
    }

    pub fn get(&self, fragment: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == fragment)
            .map(|(_, percent)| *percent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, percent)| (name.as_str(), *percent))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed `perf report --stdio` listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerfReport {
    pub attribution: Attribution,
    pub top_symbols: Vec<String>,
}

/// Sum the sample percentages of every line mentioning a tracked fragment,
/// compared case-insensitively.
pub fn parse_perf_report(output: &str, tracked: &TrackedFunctions) -> PerfReport {
    let mut report = PerfReport::default();

    for line in output.lines() {
        if line.contains('%') && report.top_symbols.len() < TOP_SYMBOL_LINES {
            report.top_symbols.push(line.trim().to_string());
        }

        for fragment in tracked.iter() {
            if !contains_ignore_case(line, fragment) {
                continue;
            }

            let percent = PERCENT_RX
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok());

            if let Some(percent) = percent {
                report.attribution.add(fragment, percent);
            }
        }
    }

    report
}

/// Convert the leading instruction counts of `callgrind_annotate` lines that
/// contain a tracked fragment (case-sensitive) into percentages of the
/// program total. Without a readable total nothing can be normalised, so the
/// result is empty.
pub fn parse_callgrind_annotate(output: &str, tracked: &TrackedFunctions) -> Attribution {
    let mut attribution = Attribution::default();

    let Some(total) = PROGRAM_TOTALS_RX
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_count(m.as_str()))
    else {
        tracing::debug!("No PROGRAM TOTALS line in callgrind_annotate output");
        return attribution;
    };

    if total == 0.0 {
        tracing::debug!("callgrind_annotate reported zero total instructions");
        return attribution;
    }

    for line in output.lines() {
        for fragment in tracked.iter() {
            if !line.contains(fragment) {
                continue;
            }

            let count = LEADING_COUNT_RX
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_count(m.as_str()));

            if let Some(count) = count {
                attribution.add(fragment, count / total * 100.0);
            }
        }
    }

    attribution
}

/// `1,234,567` -> `1234567.0`
fn parse_count(digits: &str) -> Option<f64> {
    digits.replace(',', "").parse().ok()
}
