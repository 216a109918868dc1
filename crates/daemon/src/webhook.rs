//! `POST /github/webhooks`: signature check, event decoding, hand-off to the translator.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use checkflow_core::events::{CheckRunEvent, InstallationRepositoriesEvent, PushEvent};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::http::AppState;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing x-hub-signature-256 header")]
    MissingSignature,
    #[error("signature does not match payload")]
    BadSignature,
    #[error("missing x-github-event header")]
    MissingEvent,
    #[error("unparsable {kind} payload: {source}")]
    Payload {
        kind: String,
        source: serde_json::Error,
    },
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::BadSignature => StatusCode::UNAUTHORIZED,
            Self::MissingEvent | Self::Payload { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

/// Webhook events the pipeline reacts to.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Push(PushEvent),
    CheckRun(CheckRunEvent),
    InstallationRepositories(InstallationRepositoriesEvent),
}

fn keyed(secret: &[u8], body: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::BadSignature)?;
    mac.update(body);
    Ok(mac)
}

/// `sha256=<hex>` signature of a body.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let digest = keyed(secret, body)?.finalize().into_bytes();
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

/// Checks a `sha256=<hex>` signature in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let expected = header
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|h| hex::decode(h.trim()).ok())
        .ok_or(WebhookError::BadSignature)?;
    keyed(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| WebhookError::BadSignature)
}

/// Decodes a payload of a supported kind; `Ok(None)` for every other kind.
pub fn parse_event(kind: &str, body: &[u8]) -> Result<Option<WebhookEvent>, WebhookError> {
    let payload = |source| WebhookError::Payload {
        kind: kind.to_string(),
        source,
    };
    let event = match kind {
        "push" => WebhookEvent::Push(serde_json::from_slice(body).map_err(payload)?),
        "check_run" => WebhookEvent::CheckRun(serde_json::from_slice(body).map_err(payload)?),
        "installation_repositories" => {
            WebhookEvent::InstallationRepositories(serde_json::from_slice(body).map_err(payload)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

pub async fn github_webhook(
    State(st): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match receive(&st, &headers, &body).await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "webhook rejected");
            e.status()
        }
    }
}

async fn receive(st: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode, WebhookError> {
    if let Some(secret) = &st.webhook_secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        verify_signature(secret.expose().as_bytes(), body, signature)?;
    }

    let kind = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingEvent)?;
    tracing::info!(event = kind, "received webhook");

    match parse_event(kind, body)? {
        Some(event) => crate::events::handle(st, event).await,
        None => tracing::debug!(event = kind, "ignoring unsupported webhook event"),
    }
    Ok(StatusCode::ACCEPTED)
}
