//! Cloud credentials and resource inspection used by resource validation.

use std::time::Duration;

use async_trait::async_trait;
use checkflow_core::manifest::{EnvironmentSpec, MANIFEST_FILE};
use comfy_table::{presets::ASCII_MARKDOWN, Table};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Annotation;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("metadata server unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metadata server answered {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("no resource inspector configured")]
    Unconfigured,
    #[error("inspector unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("inspector answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// Observed state of one declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub exists: bool,
    pub requires_update: bool,
}

/// Supplies short-lived cloud access tokens.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CredentialError>;
}

/// Reports the status of an environment's declared resources.
#[async_trait]
pub trait ResourceInspector: Send + Sync {
    async fn inspect(
        &self,
        project: &str,
        environment: &EnvironmentSpec,
        token: &str,
    ) -> Result<Vec<ResourceStatus>, InspectorError>;
}

/// Fixed token from configuration.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn access_token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Default service account token from the GCE metadata server.
pub struct MetadataServer {
    base: String,
    http: Client,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl MetadataServer {
    pub const DEFAULT_URL: &'static str = "http://metadata.google.internal";

    pub fn new(base: &str) -> Result<Self, CredentialError> {
        let http = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl CredentialSource for MetadataServer {
    async fn access_token(&self) -> Result<String, CredentialError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base
        );
        let res = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(CredentialError::Status(res.status().as_u16()));
        }
        let token: MetadataToken = res.json().await?;
        Ok(token.access_token)
    }
}

/// Inspector reached over HTTP.
pub struct HttpInspector {
    url: String,
    http: Client,
}

#[derive(Serialize)]
struct InspectRequest<'a> {
    project: &'a str,
    environment: &'a EnvironmentSpec,
}

#[derive(Deserialize)]
struct InspectResponse {
    #[serde(default)]
    resources: Vec<ResourceStatus>,
}

impl HttpInspector {
    pub fn new(url: &str) -> Result<Self, InspectorError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }
}

#[async_trait]
impl ResourceInspector for HttpInspector {
    async fn inspect(
        &self,
        project: &str,
        environment: &EnvironmentSpec,
        token: &str,
    ) -> Result<Vec<ResourceStatus>, InspectorError> {
        let res = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .json(&InspectRequest {
                project,
                environment,
            })
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(InspectorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: InspectResponse = res.json().await?;
        Ok(parsed.resources)
    }
}

/// Stand-in used when no inspector is configured; every inspection fails.
pub struct Unconfigured;

#[async_trait]
impl ResourceInspector for Unconfigured {
    async fn inspect(
        &self,
        _project: &str,
        _environment: &EnvironmentSpec,
        _token: &str,
    ) -> Result<Vec<ResourceStatus>, InspectorError> {
        Err(InspectorError::Unconfigured)
    }
}

/// Markdown table of resource statuses, sorted by resource type.
pub fn render_status_table(statuses: &[ResourceStatus]) -> String {
    let mut rows: Vec<&ResourceStatus> = statuses.iter().collect();
    rows.sort_by(|a, b| a.kind.cmp(&b.kind));

    let mut table = Table::new();
    table
        .load_preset(ASCII_MARKDOWN)
        .set_header(vec!["Type", "Name", "Exists", "Requires Update"]);
    for s in rows {
        table.add_row(vec![
            s.kind.clone(),
            s.name.clone(),
            s.exists.to_string(),
            s.requires_update.to_string(),
        ]);
    }
    table.to_string()
}

/// One warning per resource that is missing or out of date, pinned to the manifest.
pub fn drift_annotations(statuses: &[ResourceStatus]) -> Vec<Annotation> {
    statuses
        .iter()
        .filter_map(|s| {
            let problem = if !s.exists {
                "does not exist"
            } else if s.requires_update {
                "requires an update"
            } else {
                return None;
            };
            Some(Annotation::warning(
                MANIFEST_FILE,
                format!("{} '{}' {problem}", s.kind, s.name),
            ))
        })
        .collect()
}
