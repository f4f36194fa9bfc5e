//! Mirror Agent - Main entry point
//!
//! One invocation performs one backup run and exits with its status.

use anyhow::Result;
use clap::Parser;
use mirror_agent::executor::clone::GitCli;
use mirror_agent::fs::size::{detect_size_probe, SizeProbe};
use mirror_agent::notify::{Notifier, RunContext};
use mirror_agent::orchestrator::abort_and_notify;
use mirror_agent::{config::Config, run_and_notify, utils, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Repository list (overrides config)
    #[arg(short, long, value_name = "FILE")]
    repositories: Option<PathBuf>,

    /// Backups root directory (overrides config)
    #[arg(short, long, value_name = "DIR")]
    backups_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration. An unreadable file still gets a notification, so
    // fall back to defaults plus environment to find the webhook.
    let (mut config, load_error) = match Config::load(args.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => {
            let mut fallback = Config::default();
            fallback.apply_env();
            (fallback, Some(e))
        }
    };

    if let Some(path) = args.repositories {
        config.paths.repositories_file = path;
    }
    if let Some(dir) = args.backups_dir {
        config.paths.backups_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    // Initialize logging
    if let Err(e) = utils::logger::init(&config.log.level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    tracing::info!("Starting mirror-agent v{}", env!("CARGO_PKG_VERSION"));

    let mut notifier = Notifier::new(&config.notify, RunContext::from_env())?;

    if let Some(e) = load_error {
        let result = abort_and_notify(e, &mut notifier).await;
        std::process::exit(result.exit_code());
    }

    let git = match GitCli::detect() {
        Ok(git) => git,
        Err(e) => {
            let result = abort_and_notify(e, &mut notifier).await;
            std::process::exit(result.exit_code());
        }
    };

    let size_probe: Arc<dyn SizeProbe> = Arc::from(detect_size_probe());
    tracing::debug!(probe = size_probe.name(), "Size probe selected");

    let orchestrator = Orchestrator::new(config, Arc::new(git), size_probe);
    let result = run_and_notify(orchestrator, &mut notifier).await;

    let code = result.exit_code();
    tracing::info!(exit_code = code, "Backup run complete");
    std::process::exit(code);
}
