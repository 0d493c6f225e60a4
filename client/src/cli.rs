use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{config, roundrobin, CheckpointStore, FarmStatus, JobId, Manifest};
use reqwest::Client;
use std::{collections::BTreeSet, path::PathBuf, process::ExitCode};

/// Código de salida de `resume-check` cuando no hay checkpoint.
pub const NOTHING_TO_RESUME: u8 = 14;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Operator tools for a task farm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Jobs completados y pendientes según el checkpoint
    Status {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// Sale con 0 si hay checkpoint (reenviar), 14 si no
    ResumeCheck {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// Progreso en vivo de un coordinador corriendo (MASTER_URL)
    Progress,
    /// Corre la parte round-robin de este participante sin coordinador
    Static {
        /// Por defecto, la variable de rank del lanzador
        #[arg(long)]
        rank: Option<u32>,
        /// Por defecto, la variable de tamaño del lanzador
        #[arg(long)]
        size: Option<u32>,
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct Tally {
    total: usize,
    completed: usize,
    pending: usize,
}

// ids del checkpoint que no están en el manifiesto no cuentan
fn tally(manifest: &Manifest, completed: &BTreeSet<JobId>) -> Tally {
    let done = manifest
        .jobs()
        .iter()
        .filter(|job| completed.contains(&job.id))
        .count();
    Tally {
        total: manifest.len(),
        completed: done,
        pending: manifest.len() - done,
    }
}

fn checkpoint_for(manifest: &Manifest) -> CheckpointStore {
    CheckpointStore::in_dir(manifest.directory())
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status { manifest } => {
            let manifest = Manifest::load(&manifest)?;
            let store = checkpoint_for(&manifest);
            let completed = store.load()?;

            println!("Manifest: {}", manifest.path().display());
            match completed {
                Some(completed) => {
                    let t = tally(&manifest, &completed);
                    println!("  state: incomplete ({})", store.path().display());
                    println!("  total: {}", t.total);
                    println!("  completed: {}", t.completed);
                    println!("  pending: {}", t.pending);
                }
                None => {
                    println!("  state: no checkpoint (finished or never started)");
                    println!("  total: {}", manifest.len());
                }
            }
        }
        Commands::ResumeCheck { manifest } => {
            let manifest = Manifest::load(&manifest)?;
            let store = checkpoint_for(&manifest);
            if store.exists() {
                println!("resume: {}", store.path().display());
            } else {
                println!("nothing to resume");
                return Ok(ExitCode::from(NOTHING_TO_RESUME));
            }
        }
        Commands::Progress => {
            let url = format!("{}/api/v1/status", config::master_base_url());
            let resp = Client::new()
                .get(&url)
                .send()
                .await
                .with_context(|| format!("contacting {}", url))?;

            if !resp.status().is_success() {
                bail!("coordinator answered {}", resp.status());
            }
            let status: FarmStatus = resp.json().await?;
            println!("Run {}:", status.run_id);
            println!("  started: {}", status.started_at.to_rfc3339());
            println!(
                "  jobs: {} completed ({} resumed), {} pending, {} total",
                status.completed_jobs,
                status.resumed_jobs,
                status.pending_jobs(),
                status.total_jobs
            );
            println!(
                "  workers: {} exited of {}",
                status.exited_workers, status.workers
            );
            for (rank, job) in &status.in_flight {
                println!("  rank {} -> job {}", rank, job);
            }
        }
        Commands::Static {
            rank,
            size,
            manifest,
        } => {
            let Some(rank) = rank.or_else(config::rank_from_env) else {
                bail!("rank unknown: pass --rank or set FARM_RANK");
            };
            let Some(size) = size.or_else(config::size_from_env) else {
                bail!("group size unknown: pass --size or set FARM_SIZE");
            };
            let manifest = Manifest::load(&manifest)?;
            let results = roundrobin::run_static(&manifest, rank, size).await?;

            println!("Rank {} of {}: {} jobs", rank, size, results.len());
            for (id, result) in &results {
                println!("  {}: {}", id, result);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
