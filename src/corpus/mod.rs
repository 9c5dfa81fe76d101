pub mod discovery;
pub mod runner;

use std::sync::{Arc, atomic::AtomicBool};

use chrono::Local;

use crate::{
    Result,
    core::{config::Config, energy::EnergyMeter, is_executable},
    profile::functions::TrackedFunctions,
};
pub use runner::{CorpusRunner, RunSummary};

/// Profile every problem of the configured corpus that has no report yet.
pub async fn run(config: Config, running: &Arc<AtomicBool>) -> Result<RunSummary> {
    tracing::info!("Starting corpus run at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    tracing::debug!("Resolved config: {}", serde_json::to_string_pretty(&config)?);

    if !is_executable(&config.binary_path) {
        tracing::debug!(
            "{} is not executable, expecting the command template to provide an interpreter",
            config.binary_path.display()
        );
    }

    let tracked =
        TrackedFunctions::load(&config.function_selection_file, config.missing_function_file)?;
    if tracked.is_empty() {
        tracing::warn!(
            "No tracked functions, profiled repetitions will be written as {}",
            config.profiler.empty_sentinel()
        );
    }

    let meter = match EnergyMeter::discover(&config.rapl_root) {
        Ok(meter) if meter.is_available() => {
            tracing::info!("Measuring energy on {} package(s)", meter.package_count());
            meter
        }
        Ok(_) => {
            tracing::warn!(
                "No readable RAPL counters under {}, energy will be reported as 0. Run with sudo.",
                config.rapl_root.display()
            );
            EnergyMeter::unavailable()
        }
        Err(e) => {
            tracing::warn!("RAPL setup failed: {e}. Energy will be reported as 0.");
            EnergyMeter::unavailable()
        }
    };

    let domains = discovery::find_domains(
        &config.input_directory,
        &config.problem_extension,
        &config.domain_marker,
    )?;

    tracing::info!(
        "Profiling with {:?}, {} repetition(s), {}s timeout",
        config.profiler,
        config.repetitions,
        config.timeout_secs
    );

    let mut runner = CorpusRunner::new(config, tracked, meter);
    let summary = runner.run_all(&domains, running).await?;

    tracing::info!(
        "Profiled {} problem(s), skipped {} existing, {} run(s) timed out",
        summary.profiled,
        summary.skipped,
        summary.timed_out_runs
    );
    tracing::info!("Finished at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    Ok(summary)
}
