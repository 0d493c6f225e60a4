//! Intercambio punto a punto entre el coordinador y sus workers.
//!
//! El coordinador recibe de cualquiera y responde a un rank concreto; un
//! worker solo habla con el coordinador. Los mensajes de un mismo worker se
//! observan en el orden en que los envió.

use std::future::Future;

use crate::error::TransportResult;
use crate::protocol::{Envelope, Message, Rank};

pub mod local;

/// Lado coordinador del intercambio de mensajes.
pub trait CoordinatorTransport {
    /// Próximo mensaje de cualquier worker. Debe ser cancel-safe: si se
    /// descarta el future no se pierde ningún mensaje.
    fn recv_any(&mut self) -> impl Future<Output = TransportResult<Envelope>> + Send;

    fn send(&mut self, to: Rank, message: Message)
        -> impl Future<Output = TransportResult<()>> + Send;
}

/// Lado worker del intercambio de mensajes.
pub trait WorkerTransport {
    fn rank(&self) -> Rank;

    fn send(&mut self, message: Message) -> impl Future<Output = TransportResult<()>> + Send;

    fn recv(&mut self) -> impl Future<Output = TransportResult<Message>> + Send;
}
