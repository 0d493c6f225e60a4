//! Lado worker del transporte HTTP.
//!
//! Cada `send` es un POST; si la respuesta trae un mensaje, queda encolado
//! para el próximo `recv`.

use common::{
    error::{TransportError, TransportResult},
    Envelope, EnvelopeResponse, Message, Rank, WorkerTransport,
};
use reqwest::Client;
use std::{collections::VecDeque, time::Duration};
use tracing::debug;

pub struct HttpWorkerTransport {
    client: Client,
    base_url: String,
    rank: Rank,
    replies: VecDeque<Message>,
}

fn http_error(e: reqwest::Error) -> TransportError {
    TransportError::Http(e.to_string())
}

impl HttpWorkerTransport {
    pub fn new(base_url: impl Into<String>, rank: Rank) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            rank,
            replies: VecDeque::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Consulta `/health` hasta que el coordinador responda o se acaben los `attempts`.
    pub async fn wait_for_coordinator(&self, attempts: u32, delay: Duration) -> TransportResult<()> {
        let url = format!("{}/health", self.base_url);
        for attempt in 1..=attempts.max(1) {
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!("health check {} answered {}", attempt, resp.status()),
                Err(e) => debug!("health check {} failed: {}", attempt, e),
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(TransportError::Http(format!(
            "coordinator at {} not reachable after {} attempts",
            self.base_url, attempts
        )))
    }
}

impl WorkerTransport for HttpWorkerTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn send(&mut self, message: Message) -> TransportResult<()> {
        let url = format!("{}/api/v1/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Envelope::new(self.rank, message))
            .send()
            .await
            .map_err(http_error)?;

        if !resp.status().is_success() {
            return Err(TransportError::Http(format!(
                "coordinator answered {}",
                resp.status()
            )));
        }

        let body: EnvelopeResponse = resp.json().await.map_err(http_error)?;
        if let Some(reply) = body.reply {
            self.replies.push_back(reply);
        }
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Message> {
        self.replies.pop_front().ok_or(TransportError::NoReply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_dropped() {
        let t = HttpWorkerTransport::new("http://master:8080/", 3);
        assert_eq!(t.base_url(), "http://master:8080");
        assert_eq!(t.rank(), 3);
    }

    #[tokio::test]
    async fn recv_without_a_reply_is_an_error() {
        let mut t = HttpWorkerTransport::new("http://127.0.0.1:9", 1);
        assert_eq!(t.recv().await, Err(TransportError::NoReply));
    }

    #[tokio::test]
    async fn unreachable_coordinator_gives_up() {
        // el puerto 9 (discard) no se sirve en loopback
        let t = HttpWorkerTransport::new("http://127.0.0.1:9", 1);
        let err = t
            .wait_for_coordinator(2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
