//! Loop del coordinador: reparte los jobs del manifiesto a pedido de los
//! workers, opcionalmente corre uno propio, y guarda el checkpoint después de
//! cada cambio de estado.

use chrono::{DateTime, Utc};
use common::{
    runner::{self, ProcessHandle},
    CheckpointStore, CoordinatorTransport, Envelope, ExecutionResult, FarmError, FarmStatus,
    JobId, Manifest, Message, Rank, Result, COORDINATOR_RANK,
};
use std::{collections::BTreeSet, future, io};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::RunState;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Participantes aparte del coordinador (ranks `1..=workers`)
    pub workers: u32,
    /// Correr un job a la vez en el propio coordinador
    pub local_task: bool,
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 && !self.local_task {
            return Err(FarmError::Config(
                "no workers and local execution disabled: nothing would run".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lo que hizo una corrida del coordinador.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    /// Jobs ya completos en el checkpoint de arranque
    pub resumed: usize,
    /// Todos los jobs repartidos, a workers o al slot local, en orden
    pub dispatched: Vec<JobId>,
    /// Jobs completados en esta corrida
    pub completed: Vec<JobId>,
    /// Jobs que corrió el propio coordinador
    pub local_jobs: Vec<JobId>,
    pub checkpoint_removed: bool,
}

enum Event {
    Message(common::error::TransportResult<Envelope>),
    LocalFinished(io::Result<i32>),
}

pub struct Coordinator<T> {
    transport: T,
    config: CoordinatorConfig,
    store: CheckpointStore,
    state: RunState,
    local: Option<ProcessHandle>,
    exited: BTreeSet<Rank>,
    started_at: DateTime<Utc>,
    status: watch::Sender<FarmStatus>,
    summary: RunSummary,
}

impl<T: CoordinatorTransport> Coordinator<T> {
    /// Carga el checkpoint junto al manifiesto (resume) o arranca de cero.
    pub fn new(manifest: Manifest, transport: T, config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let store = CheckpointStore::in_dir(manifest.directory());
        let state = match store.load()? {
            Some(completed) => RunState::resume(manifest, completed),
            None => RunState::fresh(manifest),
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let (status, _) = watch::channel(FarmStatus {
            run_id: run_id.clone(),
            started_at,
            total_jobs: state.total(),
            completed_jobs: state.completed_in_manifest(),
            resumed_jobs: state.resumed(),
            in_flight: Default::default(),
            workers: config.workers,
            exited_workers: 0,
        });

        let summary = RunSummary {
            run_id,
            resumed: state.resumed(),
            ..Default::default()
        };

        Ok(Self {
            transport,
            config,
            store,
            state,
            local: None,
            exited: BTreeSet::new(),
            started_at,
            status,
            summary,
        })
    }

    /// Snapshots de progreso en vivo, actualizados tras cada cambio.
    pub fn subscribe(&self) -> watch::Receiver<FarmStatus> {
        self.status.subscribe()
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.store
    }

    /// Corre hasta que todos los workers mandan `EXIT`, termina el trabajo local
    /// y borra el checkpoint si el manifiesto quedó completo.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!(
            "---[ coordinator {} starting with {} workers @ {} ]---",
            self.summary.run_id,
            self.config.workers,
            self.started_at.format(TIMESTAMP_FORMAT)
        );
        if self.state.resumed() > 0 {
            info!(
                "resuming from checkpoint {}: {} jobs already complete",
                self.store.path().display(),
                self.state.resumed()
            );
        }
        self.persist()?;

        while (self.exited.len() as u32) < self.config.workers {
            if self.config.local_task {
                self.local_slice()?;
            }

            // lo que llegue primero: un mensaje de worker o la salida del job local
            let event = {
                let transport = &mut self.transport;
                let local = &mut self.local;
                tokio::select! {
                    envelope = transport.recv_any() => Event::Message(envelope),
                    code = wait_local(local), if local.is_some() => Event::LocalFinished(code),
                }
            };

            let changed = match event {
                Event::Message(envelope) => self.handle_message(envelope?).await,
                Event::LocalFinished(code) => {
                    self.record_local(into_result(code));
                    true
                }
            };
            if changed {
                self.persist()?;
            }
        }

        self.drain_local().await?;
        self.finish()
    }

    /// Paso 1: chequeo sin bloquear del job local; arranca el siguiente si el
    /// slot está libre.
    fn local_slice(&mut self) -> Result<()> {
        if let Some(handle) = self.local.as_mut() {
            let finished = match handle.try_poll() {
                Ok(Some(code)) => Some(Ok(code)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            };
            if let Some(code) = finished {
                self.record_local(into_result(code));
                self.persist()?;
            }
        }
        if self.local.is_none() && self.start_local() {
            self.persist()?;
        }
        Ok(())
    }

    /// Arranca el próximo job pendiente en el coordinador. Un job que no se puede
    /// lanzar cuenta como completado y se prueba el siguiente.
    fn start_local(&mut self) -> bool {
        let mut changed = false;
        while let Some(job) = self.state.next_pending() {
            changed = true;
            info!("* executing job {} on coordinator", job.id);
            self.summary.dispatched.push(job.id.clone());
            self.summary.local_jobs.push(job.id.clone());

            match runner::spawn(&job) {
                Ok(handle) => {
                    self.state.assign(COORDINATOR_RANK, job);
                    self.local = Some(handle);
                    break;
                }
                Err(e) => {
                    warn!("* executing job {} on coordinator failed: {}", job.id, e);
                    self.state.assign(COORDINATOR_RANK, job);
                    self.record_local(ExecutionResult::Failed {
                        reason: e.to_string(),
                    });
                }
            }
        }
        changed
    }

    fn record_local(&mut self, result: ExecutionResult) {
        self.local = None;
        if let Some(id) = self.state.complete(COORDINATOR_RANK) {
            info!("* coordinator finished job {} with result: {}", id, result);
            self.summary.completed.push(id);
        }
    }

    /// Paso 2: un mensaje de worker. Devuelve si cambió el estado.
    async fn handle_message(&mut self, envelope: Envelope) -> bool {
        let Envelope { source, message } = envelope;

        if source == COORDINATOR_RANK || source > self.config.workers {
            warn!("dropping {} from unknown rank {}", message.kind(), source);
            if matches!(message, Message::Ready) {
                if let Err(e) = self.transport.send(source, Message::Terminate).await {
                    debug!("could not turn away rank {}: {}", source, e);
                }
            }
            return false;
        }

        if self.exited.contains(&source) && matches!(message, Message::Ready) {
            // ya se contó su salida; un job asignado quedaría varado
            warn!("worker {} sent READY after EXIT, terminating it again", source);
            if let Err(e) = self.transport.send(source, Message::Terminate).await {
                debug!("could not terminate rank {}: {}", source, e);
            }
            return false;
        }

        match message {
            Message::Ready => self.dispatch(source).await,
            Message::Done(result) => match self.state.complete(source) {
                Some(id) => {
                    info!("| worker {} finished job {} with result: {}", source, id, result);
                    self.summary.completed.push(id);
                    true
                }
                None => {
                    warn!("worker {} reported DONE ({}) with no job in flight", source, result);
                    false
                }
            },
            Message::Exit(reason) => {
                if !self.exited.insert(source) {
                    warn!("worker {} sent EXIT twice ({})", source, reason);
                    return false;
                }
                info!("= worker {} exited with reason: {}", source, reason);
                if let Some(id) = self.state.release(source) {
                    warn!(
                        "worker {} left job {} unfinished, it goes back to the queue",
                        source, id
                    );
                }
                true
            }
            other @ (Message::Assign(_) | Message::Terminate) => {
                warn!("worker {} sent coordinator-only message {}", source, other.kind());
                false
            }
        }
    }

    async fn dispatch(&mut self, rank: Rank) -> bool {
        let mut changed = false;
        if let Some(id) = self.state.release(rank) {
            warn!(
                "worker {} asked for work while holding job {}, taking it back",
                rank, id
            );
            changed = true;
        }

        let Some(job) = self.state.next_pending() else {
            match self.transport.send(rank, Message::Terminate).await {
                Ok(()) => debug!("- no work left, terminating worker {}", rank),
                Err(e) => warn!("failed to send TERMINATE to worker {}: {}", rank, e),
            }
            return changed;
        };

        let id = job.id.clone();
        match self.transport.send(rank, Message::Assign(job.clone())).await {
            Ok(()) => {
                info!("+ sending job {} to worker {}", id, rank);
                self.state.assign(rank, job);
                self.summary.dispatched.push(id);
                true
            }
            Err(e) => {
                warn!("failed to send job {} to worker {}: {}", id, rank, e);
                self.state.requeue(job);
                changed
            }
        }
    }

    /// Tras salir el último worker: espera el job local que siga corriendo. Sin
    /// workers se sigue hasta vaciar el manifiesto; si no, no se arranca nada
    /// nuevo y lo pendiente queda en el checkpoint.
    async fn drain_local(&mut self) -> Result<()> {
        loop {
            if let Some(handle) = self.local.as_mut() {
                let code = handle.wait().await;
                self.record_local(into_result(code));
                self.persist()?;
            }
            if !self.config.local_task || self.config.workers > 0 {
                return Ok(());
            }
            if self.start_local() {
                self.persist()?;
            }
            if self.local.is_none() {
                return Ok(());
            }
        }
    }

    fn finish(mut self) -> Result<RunSummary> {
        if self.state.is_finished() {
            self.summary.checkpoint_removed = self.store.remove()?;
            info!(
                "---[ coordinator {} finishing @ {}: {} jobs completed this run ]---",
                self.summary.run_id,
                Utc::now().format(TIMESTAMP_FORMAT),
                self.summary.completed.len()
            );
        } else {
            self.persist()?;
            warn!(
                "{} jobs not completed, keeping checkpoint {} for a resumed run",
                self.state.unfinished(),
                self.store.path().display()
            );
        }
        Ok(self.summary)
    }

    fn persist(&mut self) -> Result<()> {
        self.store.save(self.state.completed())?;
        self.status.send_replace(FarmStatus {
            run_id: self.summary.run_id.clone(),
            started_at: self.started_at,
            total_jobs: self.state.total(),
            completed_jobs: self.state.completed_in_manifest(),
            resumed_jobs: self.state.resumed(),
            in_flight: self.state.in_flight_ids(),
            workers: self.config.workers,
            exited_workers: self.exited.len() as u32,
        });
        Ok(())
    }
}

async fn wait_local(local: &mut Option<ProcessHandle>) -> io::Result<i32> {
    match local {
        Some(handle) => handle.wait().await,
        None => future::pending().await,
    }
}

fn into_result(code: io::Result<i32>) -> ExecutionResult {
    match code {
        Ok(code) => ExecutionResult::Exited { code },
        Err(e) => ExecutionResult::Failed {
            reason: format!("wait failed: {}", e),
        },
    }
}
