//! Loading and resolving the harness configuration.
//!
//! The config file (JSON, or TOML when the extension is `.toml`) is merged with
//! `HYPE_*` environment overrides through figment, then validated into an
//! immutable [`Config`] whose paths are absolute.

use figment::{
    Figment,
    providers::{Env, Format, Json, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    core::{
        error::{HarnessError, HarnessErrorKind, Result},
        process::CommandTemplate,
    },
    profile::{ProfilerKind, functions::MissingFunctionFile},
};

pub const ENV_PREFIX: &str = "HYPE_";

/// The keys as they appear in the config file. Everything is optional here so
/// missing required keys can be reported by name.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub project_root: Option<PathBuf>,
    pub input_directory: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub function_selection_file: Option<PathBuf>,
    pub binary_path: Option<PathBuf>,
    pub repetitions: Option<u32>,
    pub timeout: Option<u64>,
    pub profiler: Option<ProfilerKind>,
    pub missing_function_file: Option<MissingFunctionFile>,
    pub pre_delay_secs: Option<u64>,
    pub repetition_delay_secs: Option<u64>,
    pub command: Option<String>,
    pub clean_command: Option<String>,
    pub problem_extension: Option<String>,
    pub domain_marker: Option<String>,
    pub rapl_root: Option<PathBuf>,
    pub perf_binary: Option<PathBuf>,
    pub perf_frequency: Option<u32>,
    pub valgrind_binary: Option<PathBuf>,
    pub callgrind_annotate_binary: Option<PathBuf>,
    pub verbose: Option<bool>,
}

/// Locations and settings of the external profiling tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolConfig {
    pub perf: PathBuf,
    pub perf_frequency: u32,
    pub valgrind: PathBuf,
    pub callgrind_annotate: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            perf: PathBuf::from("perf"),
            perf_frequency: 999,
            valgrind: PathBuf::from("valgrind"),
            callgrind_annotate: PathBuf::from("callgrind_annotate"),
        }
    }
}

/// Fully resolved configuration. Loaded once at startup and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub project_root: PathBuf,
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub function_selection_file: PathBuf,
    pub binary_path: PathBuf,
    pub repetitions: u32,
    pub timeout_secs: u64,
    pub profiler: ProfilerKind,
    pub missing_function_file: MissingFunctionFile,
    pub pre_delay_secs: u64,
    pub repetition_delay_secs: u64,
    pub command: CommandTemplate,
    pub clean_command: CommandTemplate,
    pub problem_extension: String,
    pub domain_marker: String,
    pub rapl_root: PathBuf,
    pub tools: ToolConfig,
    pub verbose: bool,
}

impl Config {
    /// Read, merge and resolve the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HarnessError::from(HarnessErrorKind::ConfigFileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let figment = create_figment_from_file(path);
        let raw: RawConfig = figment.extract()?;
        let cwd = std::env::current_dir()?;

        let config = Self::resolve(raw, &cwd)?;
        config.validate()?;
        Ok(config)
    }

    /// Turn the raw keys into a config, resolving every path against the
    /// project root. `cwd` anchors a relative `project_root`.
    pub fn resolve(raw: RawConfig, cwd: &Path) -> Result<Self> {
        let project_root = match raw.project_root {
            Some(root) => absolutize(cwd, &expand_home(root)),
            None => cwd.to_path_buf(),
        };

        let input_directory = required(raw.input_directory, "input_directory")?;
        let output_directory = required(raw.output_directory, "output_directory")?;
        let function_selection_file =
            required(raw.function_selection_file, "function_selection_file")?;
        let binary_path = required(raw.binary_path, "binary_path")?;
        let repetitions = required(raw.repetitions, "repetitions")?;

        if repetitions == 0 {
            return Err(HarnessErrorKind::InvalidConfigValue {
                key: "repetitions",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        let profiler = raw.profiler.unwrap_or_default();

        let command = CommandTemplate::parse(
            raw.command
                .as_deref()
                .unwrap_or(profiler.default_command_template()),
        )?;
        let clean_command = match raw.clean_command.as_deref() {
            Some(template) => CommandTemplate::parse(template)?,
            None => command.clone(),
        };

        let defaults = ToolConfig::default();
        let tools = ToolConfig {
            perf: resolve_tool(&project_root, raw.perf_binary.unwrap_or(defaults.perf)),
            perf_frequency: raw.perf_frequency.unwrap_or(defaults.perf_frequency),
            valgrind: resolve_tool(&project_root, raw.valgrind_binary.unwrap_or(defaults.valgrind)),
            callgrind_annotate: resolve_tool(
                &project_root,
                raw.callgrind_annotate_binary
                    .unwrap_or(defaults.callgrind_annotate),
            ),
        };

        let problem_extension = raw
            .problem_extension
            .unwrap_or_else(|| "hddl".to_string())
            .trim_start_matches('.')
            .to_string();

        Ok(Self {
            input_directory: absolutize(&project_root, &expand_home(input_directory)),
            output_directory: absolutize(&project_root, &expand_home(output_directory)),
            function_selection_file: absolutize(
                &project_root,
                &expand_home(function_selection_file),
            ),
            binary_path: absolutize(&project_root, &expand_home(binary_path)),
            repetitions,
            timeout_secs: raw.timeout.unwrap_or(profiler.default_timeout_secs()),
            missing_function_file: raw
                .missing_function_file
                .unwrap_or(profiler.default_missing_function_file()),
            pre_delay_secs: raw
                .pre_delay_secs
                .unwrap_or(profiler.default_pre_delay_secs()),
            repetition_delay_secs: raw
                .repetition_delay_secs
                .unwrap_or(profiler.default_repetition_delay_secs()),
            command,
            clean_command,
            problem_extension,
            domain_marker: raw.domain_marker.unwrap_or_else(|| "domain".to_string()),
            rapl_root: absolutize(
                &project_root,
                &expand_home(
                    raw.rapl_root
                        .unwrap_or_else(|| PathBuf::from("/sys/class/powercap")),
                ),
            ),
            tools,
            verbose: raw.verbose.unwrap_or(false),
            profiler,
            project_root,
        })
    }

    /// Startup preconditions on the filesystem.
    pub fn validate(&self) -> Result<()> {
        if !self.input_directory.is_dir() {
            return Err(HarnessErrorKind::InputDirectoryNotFound {
                path: self.input_directory.clone(),
            }
            .into());
        }

        if !self.binary_path.exists() {
            let hint = format!(
                "relative paths are resolved against project_root {}",
                self.project_root.display()
            );
            return Err(HarnessError::from(HarnessErrorKind::BinaryNotFound {
                path: self.binary_path.clone(),
            })
            .with_hint(Some(hint)));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pre_delay(&self) -> Duration {
        Duration::from_secs(self.pre_delay_secs)
    }

    pub fn repetition_delay(&self) -> Duration {
        Duration::from_secs(self.repetition_delay_secs)
    }
}

/// Build the provider chain for a config file: the file itself, then env
/// overrides on top.
pub fn create_figment_from_file(path: &Path) -> Figment {
    let figment = Figment::new();
    let figment = if path.extension().is_some_and(|ext| ext == "toml") {
        figment.merge(Toml::file(path))
    } else {
        figment.merge(Json::file(path))
    };

    figment.merge(Env::prefixed(ENV_PREFIX))
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T> {
    value.ok_or_else(|| HarnessErrorKind::MissingConfigKey { key }.into())
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: PathBuf) -> PathBuf {
    if let (Ok(rest), Some(home)) = (path.strip_prefix("~"), dirs::home_dir()) {
        return home.join(rest);
    }
    path
}

/// Bare tool names are left for PATH lookup; anything with a directory
/// component is anchored at the project root.
fn resolve_tool(project_root: &Path, tool: PathBuf) -> PathBuf {
    if tool.components().count() > 1 {
        absolutize(project_root, &expand_home(tool))
    } else {
        tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RawConfig {
        RawConfig {
            input_directory: Some("inputs".into()),
            output_directory: Some("results".into()),
            function_selection_file: Some("functions.txt".into()),
            binary_path: Some("wrap_hype.sh".into()),
            repetitions: Some(30),
            ..Default::default()
        }
    }

    #[test]
    fn test_paths_resolve_against_project_root() {
        let raw = RawConfig {
            project_root: Some("bench".into()),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();

        assert_eq!(config.project_root, PathBuf::from("/work/bench"));
        assert_eq!(config.input_directory, PathBuf::from("/work/bench/inputs"));
        assert_eq!(config.output_directory, PathBuf::from("/work/bench/results"));
        assert_eq!(
            config.function_selection_file,
            PathBuf::from("/work/bench/functions.txt")
        );
        assert_eq!(config.binary_path, PathBuf::from("/work/bench/wrap_hype.sh"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let raw = RawConfig {
            output_directory: Some("/data/out".into()),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();
        assert_eq!(config.output_directory, PathBuf::from("/data/out"));
    }

    #[test]
    fn test_missing_key_is_reported_by_name() {
        let raw = RawConfig {
            binary_path: None,
            ..minimal()
        };
        let err = Config::resolve(raw, Path::new("/work")).unwrap_err();
        assert!(matches!(
            err.kind(),
            HarnessErrorKind::MissingConfigKey { key: "binary_path" }
        ));
    }

    #[test]
    fn test_zero_repetitions_rejected() {
        let raw = RawConfig {
            repetitions: Some(0),
            ..minimal()
        };
        assert!(Config::resolve(raw, Path::new("/work")).is_err());
    }

    #[test]
    fn test_perf_defaults() {
        let config = Config::resolve(minimal(), Path::new("/work")).unwrap();
        assert_eq!(config.profiler, ProfilerKind::Perf);
        assert_eq!(config.timeout_secs, 600);
        assert_eq!(config.missing_function_file, MissingFunctionFile::Ignore);
        assert_eq!(config.pre_delay_secs, 5);
        assert_eq!(config.repetition_delay_secs, 2);
        assert_eq!(config.problem_extension, "hddl");
        assert_eq!(config.domain_marker, "domain");
        assert_eq!(config.tools.perf, PathBuf::from("perf"));
        assert_eq!(config.tools.perf_frequency, 999);
    }

    #[test]
    fn test_callgrind_defaults() {
        let raw = RawConfig {
            profiler: Some(ProfilerKind::Callgrind),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.missing_function_file, MissingFunctionFile::Fatal);
        assert_eq!(config.pre_delay_secs, 0);
        assert!(config.command.uses_domain());
    }

    #[test]
    fn test_clean_command_defaults_to_command() {
        let raw = RawConfig {
            command: Some("python3 {binary} {problem}".into()),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();
        assert_eq!(config.command, config.clean_command);
    }

    #[test]
    fn test_tool_paths_with_directories_are_anchored() {
        let raw = RawConfig {
            perf_binary: Some("tools/perf".into()),
            valgrind_binary: Some("/opt/valgrind/bin/valgrind".into()),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();
        assert_eq!(config.tools.perf, PathBuf::from("/work/tools/perf"));
        assert_eq!(
            config.tools.valgrind,
            PathBuf::from("/opt/valgrind/bin/valgrind")
        );
        assert_eq!(
            config.tools.callgrind_annotate,
            PathBuf::from("callgrind_annotate")
        );
    }

    #[test]
    fn test_extension_leading_dot_is_stripped() {
        let raw = RawConfig {
            problem_extension: Some(".pddl".into()),
            ..minimal()
        };
        let config = Config::resolve(raw, Path::new("/work")).unwrap();
        assert_eq!(config.problem_extension, "pddl");
    }
}
