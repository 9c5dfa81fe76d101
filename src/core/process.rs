//! Launching the planner under an energy measurement, with a timeout.

use serde::Serialize;
use std::{
    path::Path,
    process::{ExitStatus, Stdio},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};
use tokio::process::{Child, Command};

use crate::core::{
    Result,
    energy::EnergyMeter,
    error::{HarnessError, HarnessErrorKind},
};

const PLACEHOLDERS: [&str; 3] = ["binary", "domain", "problem"];
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// An argv template with `{binary}`, `{domain}` and `{problem}` placeholders.
/// Tokens are split on whitespace; no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

/// Values substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct CommandVars<'a> {
    pub binary: &'a Path,
    pub domain: Option<&'a Path>,
    pub problem: &'a Path,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return Err(HarnessErrorKind::EmptyCommand.into());
        }

        for token in &tokens {
            let mut rest = token.as_str();
            while let Some(open) = rest.find('{') {
                let after = &rest[open + 1..];
                let Some(close) = after.find('}') else { break };
                let name = &after[..close];
                if !PLACEHOLDERS.contains(&name) {
                    return Err(HarnessErrorKind::UnknownPlaceholder {
                        placeholder: name.to_string(),
                    }
                    .into());
                }
                rest = &after[close + 1..];
            }
        }

        Ok(Self { tokens })
    }

    pub fn uses_domain(&self) -> bool {
        self.tokens.iter().any(|token| token.contains("{domain}"))
    }

    /// Substitute the placeholders. A missing domain renders as an empty string.
    pub fn render(&self, vars: &CommandVars<'_>) -> Vec<String> {
        let binary = vars.binary.to_string_lossy();
        let problem = vars.problem.to_string_lossy();
        let domain = vars
            .domain
            .map(|d| d.to_string_lossy())
            .unwrap_or_default();

        self.tokens
            .iter()
            .map(|token| {
                token
                    .replace("{binary}", &binary)
                    .replace("{problem}", &problem)
                    .replace("{domain}", &domain)
            })
            .collect()
    }
}

/// How a measured run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(Option<i32>),
    TimedOut,
    Interrupted,
}

/// The result of one measured run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub energy_uj: u64,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// A run that never started.
    pub fn failed() -> Self {
        Self {
            energy_uj: 0,
            termination: Termination::Exited(None),
            elapsed: Duration::ZERO,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    pub fn interrupted(&self) -> bool {
        self.termination == Termination::Interrupted
    }
}

/// Runs one subprocess at a time, bracketed by an energy measurement.
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `argv`, optionally prefixed by a profiler `wrapper`, and return the
    /// energy consumed. A run that exceeds the timeout is killed and reports
    /// zero energy.
    pub async fn run(
        &self,
        argv: &[String],
        wrapper: Option<&[String]>,
        meter: &mut EnergyMeter,
        running: &AtomicBool,
    ) -> Result<RunOutcome> {
        let full: Vec<&String> = wrapper.unwrap_or_default().iter().chain(argv).collect();
        let (program, args) = full
            .split_first()
            .ok_or_else(|| HarnessError::from(HarnessErrorKind::EmptyCommand))?;

        let mut std_cmd = std::process::Command::new(program);
        std_cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {}", full.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" "));

        let session = meter.begin();
        let start = Instant::now();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = session.end();
                let hint = if e.kind() == std::io::ErrorKind::NotFound {
                    Some(format!("'{program}' was not found on PATH"))
                } else {
                    None
                };
                return Err(HarnessError::from(e).with_hint(hint));
            }
        };

        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            _ = tokio::time::sleep(self.timeout) => Wake::Deadline,
            _ = wait_for_shutdown(running) => Wake::Shutdown,
        };

        let termination = match wake {
            Wake::Exited(status) => Termination::Exited(status?.code()),
            Wake::Deadline => {
                kill_process_group(&mut child).await;
                Termination::TimedOut
            }
            Wake::Shutdown => {
                kill_process_group(&mut child).await;
                Termination::Interrupted
            }
        };

        let measured = session.end();
        let elapsed = start.elapsed();

        let energy_uj = match termination {
            Termination::Exited(code) => {
                if code != Some(0) {
                    tracing::debug!("{program} exited with code {code:?}");
                }
                measured
            }
            Termination::TimedOut => {
                tracing::warn!("TIMED OUT after {}s", self.timeout.as_secs());
                0
            }
            Termination::Interrupted => 0,
        };

        Ok(RunOutcome {
            energy_uj,
            termination,
            elapsed,
        })
    }
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Deadline,
    Shutdown,
}

/// Kill the child and everything it spawned, then reap it.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg takes plain integers. The child leads its own group
        // because it was spawned with process_group(0).
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill after group kill: {e}");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!("Failed to reap killed child: {e}");
    }
}

async fn wait_for_shutdown(running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
}
