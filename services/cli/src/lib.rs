mod cli;
mod commands;
mod infra;

use paperless_permission::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
