use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use checkflow_core::{check::AlreadyAttached, manifest::ManifestError};
use thiserror::Error;

use crate::{
    cloud::{CredentialError, InspectorError},
    platform::PlatformError,
    remote::RemoteError,
};

/// Why a check stage failed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("cloud credential: {0}")]
    Credential(#[from] CredentialError),
    #[error("resource inspection: {0}")]
    Inspector(#[from] InspectorError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("commit has no 'phantom.yaml' file")]
    MissingManifest,
    #[error("{entity} '{name}' is not declared in 'phantom.yaml'")]
    Undeclared { entity: &'static str, name: String },
    #[error(transparent)]
    Handle(#[from] AlreadyAttached),
}

impl CheckError {
    /// Configuration errors are fixed by changing the repository, not by retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Manifest(_) | Self::MissingManifest | Self::Undeclared { .. }
        )
    }
}

/// A failed stage together with the summary shown on the check run.
#[derive(Debug, Error)]
#[error("{summary}: {error}")]
pub struct StageFailure {
    pub summary: String,
    #[source]
    pub error: CheckError,
}

/// Attaches a check-run summary to a fallible stage step.
pub trait OrFail<T> {
    fn or_fail(self, summary: impl Into<String>) -> Result<T, StageFailure>;
}

impl<T, E: Into<CheckError>> OrFail<T> for Result<T, E> {
    fn or_fail(self, summary: impl Into<String>) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            summary: summary.into(),
            error: e.into(),
        })
    }
}

/// Handler error rendered as a JSON 500.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        let body = Json(serde_json::json!({
            "error": self.0.to_string()
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
