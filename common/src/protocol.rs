use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::job::{JobDescriptor, JobId};
use crate::results::ExecutionResult;

/// Índice del participante en la granja. El rank 0 es el coordinador.
pub type Rank = u32;

pub const COORDINATOR_RANK: Rank = 0;

/// Motivo de salida que reporta un worker tras un `Terminate` normal.
pub const NORMAL_EXIT: &str = "normal";

/* --------- Mensajes coordinador <-> worker --------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// worker -> coordinador: dame trabajo
    Ready,
    /// coordinador -> worker
    Assign(JobDescriptor),
    /// worker -> coordinador: terminó el job asignado
    Done(ExecutionResult),
    /// worker -> coordinador: último mensaje del worker
    Exit(String),
    /// coordinador -> worker: no queda nada
    Terminate,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ready => "READY",
            Message::Assign(_) => "ASSIGN",
            Message::Done(_) => "DONE",
            Message::Exit(_) => "EXIT",
            Message::Terminate => "TERMINATE",
        }
    }
}

/// Un mensaje junto con su remitente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Rank,
    pub message: Message,
}

impl Envelope {
    pub fn new(source: Rank, message: Message) -> Self {
        Self { source, message }
    }
}

/// Cuerpo de la respuesta HTTP a un envelope. Solo `READY` recibe respuesta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeResponse {
    pub reply: Option<Message>,
}

/* --------- Estado publicado por el coordinador --------- */

/// Snapshot de progreso, de solo lectura, que publica el coordinador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmStatus {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    /// Jobs ya completos cuando arrancó esta corrida
    pub resumed_jobs: usize,
    pub in_flight: BTreeMap<Rank, JobId>,
    pub workers: u32,
    pub exited_workers: u32,
}

impl FarmStatus {
    pub fn pending_jobs(&self) -> usize {
        self.total_jobs
            .saturating_sub(self.completed_jobs)
            .saturating_sub(self.in_flight.len())
    }
}
