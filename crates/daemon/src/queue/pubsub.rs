//! Google Cloud Pub/Sub over its REST API.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{QueueError, QueueTransport};
use crate::cloud::CredentialSource;

#[derive(Debug, Clone)]
pub struct PubSubConfig {
    pub endpoint: String,
    pub project: String,
    pub topic: String,
}

impl PubSubConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://pubsub.googleapis.com";

    pub fn topic_path(&self) -> String {
        format!("projects/{}/topics/{}", self.project, self.topic)
    }
}

pub struct PubSubTransport {
    config: PubSubConfig,
    credentials: Arc<dyn CredentialSource>,
    http: Client,
}

impl std::fmt::Debug for PubSubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubTransport")
            .field("config", &self.config)
            .field("credentials", &"<CredentialSource>")
            .finish()
    }
}

#[derive(Serialize)]
struct PublishRequest {
    messages: Vec<OutboundMessage>,
}

#[derive(Serialize)]
struct OutboundMessage {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl PubSubTransport {
    pub fn new(
        config: PubSubConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, QueueError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            config,
            credentials,
            http,
        })
    }
}

#[async_trait]
impl QueueTransport for PubSubTransport {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError> {
        let token = self.credentials.access_token().await?;
        let url = format!(
            "{}/v1/{}:publish",
            self.config.endpoint.trim_end_matches('/'),
            self.config.topic_path()
        );
        let body = PublishRequest {
            messages: vec![OutboundMessage {
                data: STANDARD.encode(payload),
            }],
        };

        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: PublishResponse = res.json().await?;
        parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or(QueueError::MissingMessageId)
    }
}

/// Push delivery body posted by a Pub/Sub push subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
    #[serde(rename = "messageId", alias = "message_id", default)]
    pub message_id: String,
}

impl PushMessage {
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_envelope_decodes_payload() {
        let env: PushEnvelope = serde_json::from_value(serde_json::json!({
            "message": { "data": STANDARD.encode(b"\x08\x01"), "messageId": "123" },
            "subscription": "projects/p/subscriptions/checks"
        }))
        .unwrap();
        assert_eq!(env.message.message_id, "123");
        assert_eq!(env.message.payload().unwrap(), vec![0x08, 0x01]);
    }

    #[test]
    fn topic_path_names_project_and_topic() {
        let cfg = PubSubConfig {
            endpoint: PubSubConfig::DEFAULT_ENDPOINT.into(),
            project: "acme".into(),
            topic: "github-checks".into(),
        };
        assert_eq!(cfg.topic_path(), "projects/acme/topics/github-checks");
    }
}
