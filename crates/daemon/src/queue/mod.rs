//! Moves encoded check records through an at-least-once queue.

use std::sync::Arc;

use async_trait::async_trait;
use checkflow_core::{
    codec::{self, CodecError},
    CheckRecord,
};
use thiserror::Error;

use crate::cloud::CredentialError;

pub mod local;
pub mod pubsub;

pub use local::LocalTransport;
pub use pubsub::{PubSubConfig, PubSubTransport, PushEnvelope};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("queue rejected publish ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("queue returned no message id")]
    MissingMessageId,
    #[error("queue credential: {0}")]
    Credential(#[from] CredentialError),
    #[error("local queue is closed")]
    Closed,
}

/// Publishes opaque payloads. Delivery and retry belong to the transport.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Blocks until the transport accepted the payload; returns its message id.
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError>;
}

/// Record-level view of a transport.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn QueueTransport>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    pub async fn publish(&self, record: &CheckRecord) -> Result<String, QueueError> {
        let message_id = self.transport.publish(codec::encode(record)).await?;
        tracing::info!(
            check = %record.display_name(),
            repo = %record.context.repo,
            sha = %record.context.head_sha,
            %message_id,
            "published check"
        );
        Ok(message_id)
    }
}

/// Decodes a delivered payload.
pub fn consume(payload: &[u8]) -> Result<CheckRecord, CodecError> {
    codec::decode(payload)
}
