mod cli;
mod commands;
mod infra;

use home_triage::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
