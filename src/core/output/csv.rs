use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    Result,
    core::output::{HEADER, MeasurementRow},
};

const PARTIAL_SUFFIX: &str = "partial";

/// Where rows go while a problem is still being measured.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// A report being written. Each row is flushed as soon as it is written; the
/// file only appears under its final name after [`ProblemReport::finish`].
pub struct ProblemReport {
    writer: csv::Writer<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
    rows: usize,
}

impl ProblemReport {
    /// Start a report that will end up at `final_path`. A stale partial file
    /// from an interrupted run is overwritten.
    pub fn create(final_path: &Path) -> Result<Self> {
        let partial_path = partial_path(final_path);
        let mut writer = csv::Writer::from_path(&partial_path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;

        Ok(Self {
            writer,
            partial_path,
            final_path: final_path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write_row(&mut self, row: &MeasurementRow) -> Result<()> {
        self.writer.write_record(row.to_record())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Mark the report complete by moving it to its final name.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        drop(self.writer);
        std::fs::rename(&self.partial_path, &self.final_path)?;
        tracing::debug!("Report written to {}", self.final_path.display());
        Ok(self.final_path)
    }

    /// Leave the partial file in place so the problem is redone on restart.
    pub fn abandon(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.partial_path)
    }
}
