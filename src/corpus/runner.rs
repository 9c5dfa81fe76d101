//! Running the measurement protocol over every problem of a corpus.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use crate::{
    core::{
        Result,
        config::Config,
        energy::EnergyMeter,
        format_duration,
        output::{MeasurementRow, ProblemReport, ensure_output_dir},
        process::{CommandVars, ProcessRunner, RunOutcome},
    },
    corpus::discovery::{Domain, Problem},
    profile::{Profiler, functions::TrackedFunctions},
};

/// Totals for one walk over the corpus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub profiled: usize,
    pub skipped: usize,
    pub timed_out_runs: usize,
    pub interrupted: bool,
}

/// How a single problem ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemOutcome {
    Completed { timed_out_runs: usize },
    Interrupted,
}

pub struct CorpusRunner {
    config: Config,
    tracked: TrackedFunctions,
    profiler: Profiler,
    process: ProcessRunner,
    meter: EnergyMeter,
}

impl CorpusRunner {
    pub fn new(config: Config, tracked: TrackedFunctions, meter: EnergyMeter) -> Self {
        let profiler = Profiler::new(config.profiler, config.tools.clone());
        let process = ProcessRunner::new(config.timeout());

        Self {
            config,
            tracked,
            profiler,
            process,
            meter,
        }
    }

    /// Walk every domain in order, skipping problems whose report exists.
    pub async fn run_all(&mut self, domains: &[Domain], running: &AtomicBool) -> Result<RunSummary> {
        let total_problems: usize = domains.iter().map(|d| d.problems.len()).sum();
        let needs_domain_file =
            self.config.command.uses_domain() || self.config.clean_command.uses_domain();
        let start_time = Instant::now();
        let mut summary = RunSummary::default();
        let mut done = 0usize;
        let mut profiled_elapsed = Duration::ZERO;

        let progress = ProgressBar::new(total_problems as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("=="),
        );
        progress.enable_steady_tick(Duration::from_millis(100));

        'domains: for domain in domains {
            if domain.problems.is_empty() {
                tracing::debug!("Skipping domain {} (no problems)", domain.name);
                continue;
            }

            if needs_domain_file && domain.domain_file.is_none() {
                tracing::warn!(
                    "Skipping domain {}: no domain definition file found in {}",
                    domain.name,
                    domain.path.display()
                );
                done += domain.problems.len();
                progress.set_position(done as u64);
                continue;
            }

            let count = domain.problems.len();
            tracing::info!("--- Processing Domain: {} ({count} problems) ---", domain.name);

            for (idx, problem) in domain.problems.iter().enumerate() {
                if !running.load(Ordering::SeqCst) {
                    summary.interrupted = true;
                    break 'domains;
                }

                progress.set_position(done as u64);
                done += 1;

                let report_path = problem.report_path(&self.config.output_directory, domain);
                if report_path.exists() {
                    tracing::info!(
                        "  [{}/{count}] Skipping {} (Result exists)",
                        idx + 1,
                        problem.file_name()
                    );
                    summary.skipped += 1;
                    continue;
                }

                let eta_message = if summary.profiled > 0 {
                    let avg_per_problem = profiled_elapsed / summary.profiled as u32;
                    let remaining = (total_problems - done + 1) as u32;
                    format!(
                        "{}/{} [ETA: {}]",
                        domain.name,
                        problem.stem,
                        format_duration(avg_per_problem * remaining)
                    )
                } else {
                    format!("{}/{}", domain.name, problem.stem)
                };
                progress.set_message(eta_message);

                tracing::info!("  [{}/{count}] Profiling {}...", idx + 1, problem.file_name());

                let problem_start = Instant::now();
                match self.profile_problem(domain, problem, running).await? {
                    ProblemOutcome::Completed { timed_out_runs } => {
                        summary.profiled += 1;
                        summary.timed_out_runs += timed_out_runs;
                        profiled_elapsed += problem_start.elapsed();
                    }
                    ProblemOutcome::Interrupted => {
                        summary.interrupted = true;
                        break 'domains;
                    }
                }
            }
        }

        progress.set_position(done as u64);
        if summary.interrupted {
            progress.finish_with_message("Profiling interrupted");
        } else {
            progress.finish_with_message("Profiling complete!");
        }

        tracing::debug!("Corpus walk took {}", format_duration(start_time.elapsed()));

        Ok(summary)
    }

    /// One profiled repetition followed by the clean repetitions, written to
    /// the problem's report.
    pub async fn profile_problem(
        &mut self,
        domain: &Domain,
        problem: &Problem,
        running: &AtomicBool,
    ) -> Result<ProblemOutcome> {
        let output_dir = problem.output_dir(&self.config.output_directory, domain);
        ensure_output_dir(&output_dir)?;
        let report_path = problem.report_path(&self.config.output_directory, domain);

        let vars = CommandVars {
            binary: &self.config.binary_path,
            domain: domain.domain_file.as_deref(),
            problem: &problem.path,
        };
        let profiled_argv = self.config.command.render(&vars);
        let clean_argv = self.config.clean_command.render(&vars);

        if !self.config.pre_delay().is_zero() {
            tokio::time::sleep(self.config.pre_delay()).await;
        }

        let mut report = ProblemReport::create(&report_path)?;
        let mut timed_out_runs = 0;

        // Repetition 1: profiled
        let artifact = self.profiler.artifact_path(&output_dir);
        let wrapper = self.profiler.record_wrapper(&artifact);
        let outcome = self.measure(&profiled_argv, Some(wrapper.as_slice()), running).await;

        if outcome.interrupted() {
            remove_artifact(&artifact);
            let partial = report.abandon()?;
            tracing::info!("Interrupted, leaving {}", partial.display());
            return Ok(ProblemOutcome::Interrupted);
        }
        if outcome.timed_out() {
            timed_out_runs += 1;
        }

        let attribution = self.profiler.attribute(&artifact, &self.tracked).await;
        if attribution.is_empty() {
            report.write_row(&MeasurementRow::unattributed(
                1,
                outcome.energy_uj,
                self.profiler.kind().empty_sentinel(),
            ))?;
        } else {
            for (function, percent) in attribution.iter() {
                report.write_row(&MeasurementRow::attributed(
                    1,
                    outcome.energy_uj,
                    function,
                    percent,
                ))?;
            }
        }
        remove_artifact(&artifact);

        // Repetitions 2..N: clean
        for rep in 2..=self.config.repetitions {
            if !running.load(Ordering::SeqCst) {
                report.abandon()?;
                return Ok(ProblemOutcome::Interrupted);
            }

            let outcome = self.measure(&clean_argv, None, running).await;
            if outcome.interrupted() {
                report.abandon()?;
                return Ok(ProblemOutcome::Interrupted);
            }
            if outcome.timed_out() {
                timed_out_runs += 1;
            }

            report.write_row(&MeasurementRow::phase_total(rep, outcome.energy_uj))?;
            tracing::debug!(
                "    rep {rep}: {} uJ in {:.2}s",
                outcome.energy_uj,
                outcome.elapsed.as_secs_f64()
            );

            if rep < self.config.repetitions && !self.config.repetition_delay().is_zero() {
                tokio::time::sleep(self.config.repetition_delay()).await;
            }
        }

        let rows = report.rows();
        let path = report.finish()?;
        tracing::debug!("Wrote {rows} row(s) to {}", path.display());

        Ok(ProblemOutcome::Completed { timed_out_runs })
    }

    /// A run that fails to start is logged and counted as zero energy.
    async fn measure(
        &mut self,
        argv: &[String],
        wrapper: Option<&[String]>,
        running: &AtomicBool,
    ) -> RunOutcome {
        match self
            .process
            .run(argv, wrapper, &mut self.meter, running)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Run failed: {e}");
                RunOutcome::failed()
            }
        }
    }
}

fn remove_artifact(artifact: &Path) {
    if artifact.exists() {
        if let Err(e) = std::fs::remove_file(artifact) {
            tracing::warn!("Failed to remove {}: {e}", artifact.display());
        }
    }
}
