use anyhow::{bail, Result};
use clap::Parser;
use common::config;
use worker::{run_worker, HttpWorkerTransport};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Runs jobs handed out by a farm coordinator")]
struct Args {
    /// Rank de este worker (1..=N); si falta se usan las variables del lanzador
    #[arg(long, env = "FARM_RANK")]
    rank: Option<u32>,

    #[arg(long, env = "MASTER_URL", default_value = config::DEFAULT_MASTER_URL)]
    master_url: String,

    /// Chequeos de salud antes de darse por vencido
    #[arg(long, env = "FARM_CONNECT_ATTEMPTS", default_value_t = 30)]
    connect_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=info,reqwest=info")),
        )
        .init();

    let args = Args::parse();

    let Some(rank) = args.rank.or_else(config::rank_from_env) else {
        bail!("rank unknown: pass --rank or set FARM_RANK");
    };
    if rank == common::COORDINATOR_RANK {
        bail!("rank 0 is the coordinator; start master there instead");
    }

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    info!("worker rank {} on {} using {}", rank, hostname, args.master_url);

    let mut transport = HttpWorkerTransport::new(args.master_url, rank);
    transport
        .wait_for_coordinator(args.connect_attempts, CONNECT_RETRY_DELAY)
        .await?;

    let summary = run_worker(&mut transport).await;
    if !summary.is_normal() {
        bail!(
            "rank {} stopped after {} jobs: {}",
            rank,
            summary.executed,
            summary.exit_reason
        );
    }
    Ok(())
}
