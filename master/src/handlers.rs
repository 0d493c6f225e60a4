//! Lado HTTP del transporte del coordinador.
//!
//! Cada mensaje de un worker llega como un `POST /api/v1/messages`. El handler
//! lo encola para el loop del coordinador; para `READY` deja el request
//! abierto hasta que el loop responde con `ASSIGN` o `TERMINATE`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    error::{TransportError, TransportResult},
    CoordinatorTransport, Envelope, EnvelopeResponse, FarmStatus, Message, Rank,
};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::warn;

const INBOX_CAPACITY: usize = 1024;

/// Mensaje de un worker esperando al loop del coordinador.
#[derive(Debug)]
pub struct Inbound {
    envelope: Envelope,
    reply: Option<oneshot::Sender<Message>>,
}

#[derive(Clone)]
pub struct AppState {
    inbox: mpsc::Sender<Inbound>,
    status: watch::Receiver<FarmStatus>,
}

impl AppState {
    pub fn new(inbox: mpsc::Sender<Inbound>, status: watch::Receiver<FarmStatus>) -> Self {
        Self { inbox, status }
    }
}

/// Extremo del coordinador alimentado por los handlers HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    inbox: mpsc::Receiver<Inbound>,
    // requests READY abiertos, a lo sumo uno por rank
    pending: HashMap<Rank, oneshot::Sender<Message>>,
}

/// Transporte más el sender donde empuja el router.
pub fn http_transport() -> (HttpTransport, mpsc::Sender<Inbound>) {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    (
        HttpTransport {
            inbox: rx,
            pending: HashMap::new(),
        },
        tx,
    )
}

impl CoordinatorTransport for HttpTransport {
    async fn recv_any(&mut self) -> TransportResult<Envelope> {
        let Inbound { envelope, reply } = self.inbox.recv().await.ok_or(TransportError::Closed)?;
        if let Some(reply) = reply {
            if self.pending.insert(envelope.source, reply).is_some() {
                warn!(
                    "rank {} sent READY again before its previous one was answered",
                    envelope.source
                );
            }
        }
        Ok(envelope)
    }

    async fn send(&mut self, to: Rank, message: Message) -> TransportResult<()> {
        let reply = self
            .pending
            .remove(&to)
            .ok_or(TransportError::NoPendingRequest(to))?;
        reply
            .send(message)
            .map_err(|_| TransportError::Disconnected(to))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/messages", post(post_message))
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Un mensaje de un worker; READY espera la respuesta del coordinador
async fn post_message(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<EnvelopeResponse>, StatusCode> {
    let (reply_tx, reply_rx) = match envelope.message {
        Message::Ready => {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        }
        Message::Done(_) | Message::Exit(_) => (None, None),
        Message::Assign(_) | Message::Terminate => {
            warn!(
                "rank {} posted coordinator-only message {}",
                envelope.source,
                envelope.message.kind()
            );
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    state
        .inbox
        .send(Inbound {
            envelope,
            reply: reply_tx,
        })
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let reply = match reply_rx {
        Some(rx) => Some(rx.await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?),
        None => None,
    };
    Ok(Json(EnvelopeResponse { reply }))
}

async fn get_status(State(state): State<AppState>) -> Json<FarmStatus> {
    let snapshot = state.status.borrow().clone();
    Json(snapshot)
}
