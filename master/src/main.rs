use anyhow::{bail, Context, Result};
use clap::Parser;
use common::{config, Manifest};
use master::{build_router, http_transport, AppState, Coordinator, CoordinatorConfig};
use std::{path::PathBuf, time::Duration};
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "master")]
#[command(about = "Hands the jobs of a manifest out to a farm of workers")]
struct Args {
    /// Manifiesto JSON de jobs; el checkpoint vive en el mismo directorio
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,

    /// Cantidad de workers (ranks 1..=N) que se esperan
    #[arg(long, env = "FARM_WORKERS")]
    workers: Option<u32>,

    #[arg(long, env = "FARM_LISTEN", default_value = config::DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// No correr jobs en el propio coordinador
    #[arg(long)]
    no_local_task: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let workers = match args.workers {
        Some(n) => n,
        // el tamaño del lanzador incluye al coordinador
        None => match config::size_from_env() {
            Some(size) if size > 0 => size - 1,
            _ => bail!("worker count unknown: pass --workers or set FARM_WORKERS"),
        },
    };
    let coordinator_config = CoordinatorConfig {
        workers,
        local_task: !args.no_local_task && config::env_flag("FARM_LOCAL_TASK", true),
    };

    let manifest = Manifest::load(&args.manifest)?;
    info!(
        "loaded {} jobs from {}",
        manifest.len(),
        manifest.path().display()
    );

    let (transport, inbox) = http_transport();
    let coordinator = Coordinator::new(manifest, transport, coordinator_config)?;
    let app = build_router(AppState::new(inbox, coordinator.subscribe()));

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!("coordinator listening on {}", listener.local_addr()?);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let outcome = coordinator.run().await;

    let _ = stop_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("http server stopped with error: {}", e),
        Ok(Err(e)) => warn!("http server task failed: {}", e),
        Err(_) => warn!("http server did not stop within {:?}", SHUTDOWN_GRACE),
    }

    let summary = outcome?;
    info!(
        "run {} done: {} completed this run, {} resumed, {} local, checkpoint {}",
        summary.run_id,
        summary.completed.len(),
        summary.resumed,
        summary.local_jobs.len(),
        if summary.checkpoint_removed {
            "removed"
        } else {
            "kept"
        }
    );
    Ok(())
}
