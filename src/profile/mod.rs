//! Wrapping a run in a profiler and reading back function attribution.

pub mod functions;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;

use crate::core::{
    Result,
    config::ToolConfig,
    error::{HarnessError, HarnessErrorKind},
    output::{NONE_DETECTED, TIMEOUT_OR_NONE},
};
use functions::{MissingFunctionFile, TrackedFunctions};
use parser::Attribution;

/// How many top symbols are shown when nothing tracked was found.
const TOP_SYMBOLS_SHOWN: usize = 3;

/// Which profiler wraps the first repetition of every problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilerKind {
    /// `perf record` sampling, attributed from `perf report`.
    #[default]
    Perf,
    /// `valgrind --tool=callgrind`, attributed from `callgrind_annotate`.
    Callgrind,
}

impl ProfilerKind {
    pub fn default_timeout_secs(self) -> u64 {
        match self {
            ProfilerKind::Perf => 600,
            ProfilerKind::Callgrind => 30,
        }
    }

    pub fn default_missing_function_file(self) -> MissingFunctionFile {
        match self {
            ProfilerKind::Perf => MissingFunctionFile::Ignore,
            ProfilerKind::Callgrind => MissingFunctionFile::Fatal,
        }
    }

    pub fn default_pre_delay_secs(self) -> u64 {
        match self {
            ProfilerKind::Perf => 5,
            ProfilerKind::Callgrind => 0,
        }
    }

    pub fn default_repetition_delay_secs(self) -> u64 {
        match self {
            ProfilerKind::Perf => 2,
            ProfilerKind::Callgrind => 0,
        }
    }

    pub fn default_command_template(self) -> &'static str {
        match self {
            ProfilerKind::Perf => "{binary} {problem}",
            ProfilerKind::Callgrind => "ruby {binary} {domain} {problem} run",
        }
    }

    /// File name of the raw profile inside the problem's output directory.
    pub fn artifact_name(self) -> &'static str {
        match self {
            ProfilerKind::Perf => "profile.data",
            ProfilerKind::Callgrind => "profile.callgrind",
        }
    }

    /// Function column value for a profiled run with no attribution.
    pub fn empty_sentinel(self) -> &'static str {
        match self {
            ProfilerKind::Perf => NONE_DETECTED,
            ProfilerKind::Callgrind => TIMEOUT_OR_NONE,
        }
    }
}

/// A profiler bound to the tool locations from the config.
#[derive(Debug, Clone)]
pub struct Profiler {
    kind: ProfilerKind,
    tools: ToolConfig,
}

impl Profiler {
    pub fn new(kind: ProfilerKind, tools: ToolConfig) -> Self {
        Self { kind, tools }
    }

    pub fn kind(&self) -> ProfilerKind {
        self.kind
    }

    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.kind.artifact_name())
    }

    /// argv prefix that records a profile of the wrapped command to `artifact`.
    pub fn record_wrapper(&self, artifact: &Path) -> Vec<String> {
        let artifact = artifact.to_string_lossy();
        match self.kind {
            ProfilerKind::Perf => vec![
                self.tools.perf.to_string_lossy().into_owned(),
                "record".to_string(),
                "-F".to_string(),
                self.tools.perf_frequency.to_string(),
                "-g".to_string(),
                "-o".to_string(),
                artifact.into_owned(),
                "--".to_string(),
            ],
            ProfilerKind::Callgrind => vec![
                self.tools.valgrind.to_string_lossy().into_owned(),
                "--tool=callgrind".to_string(),
                "--max-stackframe=20000000".to_string(),
                format!("--callgrind-out-file={artifact}"),
            ],
        }
    }

    /// Read the profile at `artifact` and attribute it to the tracked
    /// functions. Any failure is logged and yields an empty attribution.
    pub async fn attribute(&self, artifact: &Path, tracked: &TrackedFunctions) -> Attribution {
        if !artifact.exists() {
            tracing::warn!("No profile written at {}", artifact.display());
            return Attribution::default();
        }

        let output = match self.report(artifact).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Profile parsing error: {e}");
                return Attribution::default();
            }
        };

        match self.kind {
            ProfilerKind::Perf => {
                let report = parser::parse_perf_report(&output, tracked);
                if report.attribution.is_empty() {
                    tracing::warn!(
                        "Tracked symbols not found. Top {TOP_SYMBOLS_SHOWN} actual symbols:"
                    );
                    for symbol in report.top_symbols.iter().take(TOP_SYMBOLS_SHOWN) {
                        tracing::warn!("  {symbol}");
                    }
                }
                report.attribution
            }
            ProfilerKind::Callgrind => parser::parse_callgrind_annotate(&output, tracked),
        }
    }

    /// Run the report tool and return its text output.
    async fn report(&self, artifact: &Path) -> Result<String> {
        let (program, args): (&Path, Vec<String>) = match self.kind {
            ProfilerKind::Perf => (
                self.tools.perf.as_path(),
                vec![
                    "report".to_string(),
                    "-i".to_string(),
                    artifact.to_string_lossy().into_owned(),
                    "--stdio".to_string(),
                    "--no-children".to_string(),
                    "-n".to_string(),
                ],
            ),
            ProfilerKind::Callgrind => (
                self.tools.callgrind_annotate.as_path(),
                vec![
                    "--auto=yes".to_string(),
                    artifact.to_string_lossy().into_owned(),
                ],
            ),
        };

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("Reading profile with: {} {}", program.display(), args.join(" "));

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            tracing::debug!("Out: {stdout}");
            tracing::debug!("Err: {stderr}");

            let hint = stderr.lines().find(|line| !line.trim().is_empty());
            return Err(HarnessError::from(HarnessErrorKind::ProfilerFailed {
                tool: program.display().to_string(),
                code: output.status.code().unwrap_or(-1),
            })
            .with_hint(hint));
        }

        Ok(match self.kind {
            ProfilerKind::Perf => format!("{stdout}{stderr}"),
            ProfilerKind::Callgrind => stdout.into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_record_wrapper() {
        let profiler = Profiler::new(ProfilerKind::Perf, ToolConfig::default());
        let wrapper = profiler.record_wrapper(Path::new("/out/p01/profile.data"));
        assert_eq!(
            wrapper,
            vec![
                "perf",
                "record",
                "-F",
                "999",
                "-g",
                "-o",
                "/out/p01/profile.data",
                "--"
            ]
        );
    }

    #[test]
    fn test_callgrind_record_wrapper() {
        let profiler = Profiler::new(ProfilerKind::Callgrind, ToolConfig::default());
        let artifact = profiler.artifact_path(Path::new("/out/p01"));
        assert_eq!(artifact, PathBuf::from("/out/p01/profile.callgrind"));
        assert_eq!(
            profiler.record_wrapper(&artifact),
            vec![
                "valgrind",
                "--tool=callgrind",
                "--max-stackframe=20000000",
                "--callgrind-out-file=/out/p01/profile.callgrind"
            ]
        );
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(ProfilerKind::Perf.empty_sentinel(), "NONE_DETECTED");
        assert_eq!(ProfilerKind::Callgrind.empty_sentinel(), "TIMEOUT_OR_NONE");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Profiler::new(ProfilerKind::Perf, ToolConfig::default());
        let tracked: TrackedFunctions = ["solve"].into_iter().collect();

        let attribution = profiler
            .attribute(&dir.path().join("profile.data"), &tracked)
            .await;
        assert!(attribution.is_empty());
    }

    #[tokio::test]
    async fn test_failing_report_tool_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("profile.callgrind");
        std::fs::write(&artifact, "events: Ir\n").unwrap();

        let tools = ToolConfig {
            callgrind_annotate: PathBuf::from("false"),
            ..ToolConfig::default()
        };
        let profiler = Profiler::new(ProfilerKind::Callgrind, tools);
        let tracked: TrackedFunctions = ["solve"].into_iter().collect();

        assert!(profiler.attribute(&artifact, &tracked).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_report_tool_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("profile.data");
        std::fs::write(&artifact, "").unwrap();

        let tools = ToolConfig {
            perf: PathBuf::from("/nonexistent/perf"),
            ..ToolConfig::default()
        };
        let profiler = Profiler::new(ProfilerKind::Perf, tools);
        let tracked: TrackedFunctions = ["solve"].into_iter().collect();

        assert!(profiler.attribute(&artifact, &tracked).await.is_empty());
    }
}
