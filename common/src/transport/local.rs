//! Transporte en memoria sobre canales de tokio, para correr una granja
//! completa dentro de un solo proceso.

use std::collections::HashMap;
use tokio::sync::mpsc;

use super::{CoordinatorTransport, WorkerTransport};
use crate::error::{TransportError, TransportResult};
use crate::protocol::{Envelope, Message, Rank, COORDINATOR_RANK};

/// Arma el extremo del coordinador y `workers` extremos de worker con ranks
/// `1..=workers`.
pub fn channel_farm(workers: u32) -> (LocalCoordinator, Vec<LocalWorker>) {
    let (to_coordinator, inbox) = mpsc::unbounded_channel();
    let mut outboxes = HashMap::new();
    let mut endpoints = Vec::with_capacity(workers as usize);

    for rank in 1..=workers {
        let (tx, rx) = mpsc::unbounded_channel();
        outboxes.insert(rank, tx);
        endpoints.push(LocalWorker {
            rank,
            outbox: to_coordinator.clone(),
            inbox: rx,
        });
    }

    (LocalCoordinator { inbox, outboxes }, endpoints)
}

#[derive(Debug)]
pub struct LocalCoordinator {
    inbox: mpsc::UnboundedReceiver<Envelope>,
    outboxes: HashMap<Rank, mpsc::UnboundedSender<Message>>,
}

impl CoordinatorTransport for LocalCoordinator {
    async fn recv_any(&mut self) -> TransportResult<Envelope> {
        self.inbox.recv().await.ok_or(TransportError::Closed)
    }

    async fn send(&mut self, to: Rank, message: Message) -> TransportResult<()> {
        let outbox = self
            .outboxes
            .get(&to)
            .ok_or(TransportError::UnknownRank(to))?;
        outbox
            .send(message)
            .map_err(|_| TransportError::Disconnected(to))
    }
}

#[derive(Debug)]
pub struct LocalWorker {
    rank: Rank,
    outbox: mpsc::UnboundedSender<Envelope>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl WorkerTransport for LocalWorker {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn send(&mut self, message: Message) -> TransportResult<()> {
        self.outbox
            .send(Envelope::new(self.rank, message))
            .map_err(|_| TransportError::Disconnected(COORDINATOR_RANK))
    }

    async fn recv(&mut self) -> TransportResult<Message> {
        self.inbox
            .recv()
            .await
            .ok_or(TransportError::Disconnected(COORDINATOR_RANK))
    }
}
