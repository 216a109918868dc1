use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use checkflow_core::codec::CodecError;
use tower_http::trace::TraceLayer;

use crate::{
    config::Secret,
    platform::PlatformConnector,
    queue::{self, Publisher, PushEnvelope},
    remote::RemoteService,
    setup::github_setup,
    supervisor::{DeliveryStats, Supervisor},
    webhook::github_webhook,
};

#[derive(Clone)]
pub struct AppState {
    pub publisher: Publisher,
    pub supervisor: Arc<Supervisor>,
    pub connector: Arc<dyn PlatformConnector>,
    pub remote: Arc<dyn RemoteService>,
    pub webhook_secret: Option<Secret>,
    pub site_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(healthz))
        .route("/healthz", get(healthz))
        .route("/github/webhooks", post(github_webhook))
        .route("/github/setup", get(github_setup))
        .route("/gcp/pubsub", post(pubsub_push))
        .route("/v1/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn stats(State(st): State<AppState>) -> Json<DeliveryStats> {
    Json(st.supervisor.stats())
}

/// Pub/Sub push delivery. Accepted records run in the background; the
/// transport is acknowledged right away.
async fn pubsub_push(State(st): State<AppState>, body: Bytes) -> StatusCode {
    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "could not decode push body");
            return StatusCode::BAD_REQUEST;
        }
    };
    let message_id = envelope.message.message_id.clone();
    tracing::info!(%message_id, subscription = %envelope.subscription, "got message");

    let payload = match envelope.message.payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(%message_id, error = %e, "message data is not base64");
            return StatusCode::BAD_REQUEST;
        }
    };

    match queue::consume(&payload) {
        Ok(record) => {
            st.supervisor.accept(message_id, record);
            StatusCode::OK
        }
        Err(CodecError::UnknownKind(kind)) => {
            tracing::info!(%message_id, kind, "acknowledged check of unknown kind");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(%message_id, error = %e, "could not decode check record");
            StatusCode::BAD_REQUEST
        }
    }
}
