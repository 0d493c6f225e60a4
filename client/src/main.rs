mod cli;

use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("common=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run().await
}
