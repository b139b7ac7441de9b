//! Duet bootstrap binary.
//!
//! Started in place of the host application: loads both loader subsystems,
//! then runs the application named by `DUET_ORIGINAL_APP_PATH` with the
//! process arguments and exits with its result.

use anyhow::Context;
use duet_bootstrap::{BootstrapConfig, BootstrapOrchestrator, CrashLog};
use duet_runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter.
const LOG_ENV: &str = "DUET_LOG";

fn main() -> anyhow::Result<()> {
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let cwd = std::env::current_dir().context("failed to read working directory")?;
	let config = match BootstrapConfig::discover(&cwd) {
		Ok(config) => config,
		Err(err) => {
			CrashLog::global().report_error("Config", &err);
			return Err(err).context("failed to load bootstrap config");
		}
	};
	let root = config.root(&cwd);
	CrashLog::install(root.join(&config.crash_log));

	let args: Vec<String> = std::env::args_os().skip(1).map(|arg| arg.to_string_lossy().into_owned()).collect();
	tracing::info!(root = %root.display(), args = args.len(), "duet.start");

	let runtime = Runtime::new(root.clone());
	let mut orchestrator = BootstrapOrchestrator::new(&runtime, config, args)?.with_crash_log(CrashLog::global().clone());
	let report = orchestrator.run()?;

	tracing::info!(exit_code = report.exit_code, "duet.exit");
	if report.exit_code != 0 {
		std::process::exit(report.exit_code);
	}
	Ok(())
}
