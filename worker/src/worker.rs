//! Loop del worker: pedir un job, correrlo, reportar, repetir hasta que lo frenen.

use common::{
    error::TransportResult, protocol::NORMAL_EXIT, runner, JobDescriptor, Message, Rank,
    WorkerTransport,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    Requesting,
    Executing(JobDescriptor),
    Exited(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: Rank,
    /// Jobs corridos (o fallidos al lanzar) y reportados
    pub executed: usize,
    /// `"normal"` tras `TERMINATE`; si no, la falla que cortó el loop
    pub exit_reason: String,
}

impl WorkerSummary {
    pub fn is_normal(&self) -> bool {
        self.exit_reason == NORMAL_EXIT
    }
}

/// Maneja un worker hasta `TERMINATE` o una falla de transporte. El `EXIT`
/// final se manda best-effort; si falla solo se loguea.
pub async fn run_worker<T: WorkerTransport>(transport: &mut T) -> WorkerSummary {
    let rank = transport.rank();
    let mut executed = 0;
    let mut state = WorkerState::Requesting;

    loop {
        state = match state {
            WorkerState::Requesting => match request_job(transport).await {
                Ok(Message::Assign(job)) => WorkerState::Executing(job),
                Ok(Message::Terminate) => WorkerState::Exited(NORMAL_EXIT.to_string()),
                Ok(other) => {
                    WorkerState::Exited(format!("unexpected {} from coordinator", other.kind()))
                }
                Err(e) => WorkerState::Exited(e.to_string()),
            },
            WorkerState::Executing(job) => {
                info!("rank {} running job {} ({})", rank, job.id, job.command);
                let result = runner::execute(&job).await;
                executed += 1;
                if !result.is_success() {
                    warn!("rank {} job {} finished with {}", rank, job.id, result);
                }
                match transport.send(Message::Done(result)).await {
                    Ok(()) => WorkerState::Requesting,
                    Err(e) => WorkerState::Exited(e.to_string()),
                }
            }
            WorkerState::Exited(reason) => {
                if reason != NORMAL_EXIT {
                    warn!("rank {} stopping: {}", rank, reason);
                }
                if let Err(e) = transport.send(Message::Exit(reason.clone())).await {
                    debug!("rank {} could not report exit: {}", rank, e);
                }
                info!("rank {} exited after {} jobs", rank, executed);
                return WorkerSummary {
                    rank,
                    executed,
                    exit_reason: reason,
                };
            }
        };
    }
}

async fn request_job<T: WorkerTransport>(transport: &mut T) -> TransportResult<Message> {
    transport.send(Message::Ready).await?;
    transport.recv().await
}
