use crate::commands::{run_batch, run_policy, run_restore, run_status, RestoreArgs, RunArgs};
use clap::{Parser, Subcommand};
use home_triage::config::AppConfig;
use home_triage::error::AppError;
use home_triage::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "home-triage",
    about = "Screen, score, and tier candidate properties from a listing export",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a listing CSV and drive every property through the phases
    Run(RunArgs),
    /// Show per-property phase progress from the work-item store
    Status,
    /// Restore a store file from its most recent (or a chosen) backup
    Restore(RestoreArgs),
    /// Print the effective evaluation policy as JSON
    Policy,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Run(args) => run_batch(&config, args).await,
        Command::Status => run_status(&config),
        Command::Restore(args) => run_restore(&config, args),
        Command::Policy => run_policy(&config),
    }
}
