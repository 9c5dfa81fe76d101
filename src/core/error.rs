//! Error types for the harness.

use std::{fmt, path::PathBuf};
use thiserror::Error;

/// The wrapper for the error kind, with an optional hint.
#[derive(Debug)]
pub struct HarnessError {
    kind: HarnessErrorKind,
    hint: Option<String>,
}

/// All types of errors that can occur while driving a corpus.
#[derive(Error, Debug)]
pub enum HarnessErrorKind {
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    #[error("Config file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Missing required configuration key '{key}'")]
    MissingConfigKey { key: &'static str },

    #[error("Invalid value for configuration key '{key}': {reason}")]
    InvalidConfigValue { key: &'static str, reason: String },

    #[error("Input directory does not exist: {path}")]
    InputDirectoryNotFound { path: PathBuf },

    #[error("Binary not found at configured path: {path}")]
    BinaryNotFound { path: PathBuf },

    #[error("Function selection file not found: {path}")]
    FunctionFileNotFound { path: PathBuf },

    #[error("Command template is empty")]
    EmptyCommand,

    #[error("Unknown placeholder '{placeholder}' in command template")]
    UnknownPlaceholder { placeholder: String },

    #[error("{tool} exited with code {code}")]
    ProfilerFailed { tool: String, code: i32 },

    #[error("Invalid problem file name: {path}")]
    InvalidProblemFileName { path: PathBuf },

    #[error("Progress bar template error: {0}")]
    ProgressBarError(#[from] indicatif::style::TemplateError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Glob error: {0}")]
    GlobError(#[from] glob::GlobError),

    #[error("Glob pattern error: {0}")]
    GlobPatternError(#[from] glob::PatternError),

    #[error("JSON Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl HarnessError {
    /// Attaches a hint to the error
    pub fn with_hint(mut self, hint: Option<impl Into<String>>) -> Self {
        if let Some(hint) = hint {
            self.hint = Some(hint.into());
        }
        self
    }

    pub fn kind(&self) -> &HarnessErrorKind {
        &self.kind
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint_text) = &self.hint {
            write!(f, " ({hint_text})")?;
        }

        Ok(())
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Convert Error into HarnessErrorKind
impl<E> From<E> for HarnessError
where
    HarnessErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        HarnessError {
            kind: HarnessErrorKind::from(error),
            hint: None,
        }
    }
}

impl From<figment::Error> for HarnessErrorKind {
    fn from(error: figment::Error) -> Self {
        HarnessErrorKind::ConfigLoad(Box::new(error))
    }
}

/// A convenient result type for the harness
pub type Result<T> = std::result::Result<T, HarnessError>;
