//! The list of tracked function name fragments.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::core::{
    Result,
    error::{HarnessError, HarnessErrorKind},
};

/// What to do when the function selection file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFunctionFile {
    /// Carry on with nothing tracked.
    Ignore,
    /// Refuse to start.
    Fatal,
}

/// Fragments matched against profiler output lines. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedFunctions {
    fragments: Vec<String>,
}

impl TrackedFunctions {
    pub fn load(path: &Path, missing: MissingFunctionFile) -> Result<Self> {
        if !path.is_file() {
            return match missing {
                MissingFunctionFile::Ignore => {
                    tracing::warn!(
                        "Function selection file {} not found, no functions will be tracked",
                        path.display()
                    );
                    Ok(Self::default())
                }
                MissingFunctionFile::Fatal => Err(HarnessError::from(
                    HarnessErrorKind::FunctionFileNotFound {
                        path: path.to_path_buf(),
                    },
                )
                .with_hint(Some(
                    "set missing_function_file to \"ignore\" to run without tracked functions",
                ))),
            };
        }

        let tracked = Self::parse(&fs::read_to_string(path)?);
        tracing::info!("Tracking {} function(s)", tracked.len());
        for fragment in tracked.iter() {
            tracing::debug!("  - {fragment}");
        }

        Ok(tracked)
    }

    /// One fragment per line; `#` starts a comment, blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut fragments: Vec<String> = Vec::new();

        for line in text.lines() {
            let content = line.split('#').next().unwrap_or_default().trim();
            if content.is_empty() || fragments.iter().any(|f| f == content) {
                continue;
            }
            fragments.push(content.to_string());
        }

        Self { fragments }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TrackedFunctions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().map(Into::into).collect(),
        }
    }
}
