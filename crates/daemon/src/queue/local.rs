//! In-process queue for local development and tests.

use std::sync::Arc;

use async_trait::async_trait;
use checkflow_core::codec::CodecError;
use tokio::{sync::mpsc, task::JoinHandle};

use super::{consume, QueueError, QueueTransport};
use crate::supervisor::Supervisor;

#[derive(Debug, Clone)]
pub struct LocalMessage {
    pub id: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct LocalTransport {
    tx: mpsc::UnboundedSender<LocalMessage>,
}

impl LocalTransport {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LocalMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl QueueTransport for LocalTransport {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError> {
        let id = checkflow_core::new_ulid().to_string();
        self.tx
            .send(LocalMessage {
                id: id.clone(),
                payload,
            })
            .map_err(|_| QueueError::Closed)?;
        Ok(id)
    }
}

/// Feeds every local message to the supervisor, like a push delivery would.
pub fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<LocalMessage>,
    supervisor: Arc<Supervisor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match consume(&msg.payload) {
                Ok(record) => {
                    supervisor.accept(msg.id, record);
                }
                Err(CodecError::UnknownKind(kind)) => {
                    tracing::info!(message_id = %msg.id, kind, "acknowledged check of unknown kind");
                }
                Err(e) => {
                    tracing::warn!(message_id = %msg.id, error = %e, "rejected undecodable message");
                }
            }
        }
        tracing::debug!("local queue closed");
    })
}
