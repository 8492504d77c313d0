//! `taskops`: run, validate and inspect scheduled tasks.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use taskops_core::config::TaskopsConfig;

mod commands;
mod logging;
mod task_log;

/// Schedule shell commands with retries, dependencies and single-flight runs.
#[derive(Debug, Parser)]
#[command(name = "taskops", version, about)]
struct Cli {
    /// Path to taskops.toml (default: $TASKOPS_CONFIG, then ~/.taskops/taskops.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of task YAML files.
    #[arg(long, global = true)]
    tasks_dir: Option<PathBuf>,

    /// Directory for rotated log files.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Rotated log files to keep.
    #[arg(long, global = true)]
    max_log_files: Option<usize>,

    /// SQLite database holding run-state.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the scheduler (default).
    Run,

    /// Check task definitions without running anything.
    Validate,

    /// Show recorded run-state.
    Status {
        /// Only this task, with its recent history.
        name: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// History entries to show for a named task.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl Cli {
    /// CLI flags win over file and environment settings.
    fn apply_overrides(&self, config: &mut TaskopsConfig) {
        if let Some(dir) = &self.tasks_dir {
            config.scheduler.tasks_dir = dir.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = dir.clone();
        }
        if let Some(n) = self.max_log_files {
            config.logging.max_files = n;
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // load config: --config > TASKOPS_CONFIG env > ~/.taskops/taskops.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("TASKOPS_CONFIG").map(PathBuf::from))
        .map(|p| p.to_string_lossy().into_owned());
    let mut config = TaskopsConfig::load(config_path.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config);

    let command = cli.command.unwrap_or(Command::Run);
    logging::init_logging(&config.logging, matches!(command, Command::Run));

    let ok = match command {
        Command::Run => commands::run(config).await.map(|()| true)?,
        Command::Validate => commands::validate(&config)?,
        Command::Status { name, json, limit } => {
            commands::status(&config, name.as_deref(), json, limit)?
        }
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
