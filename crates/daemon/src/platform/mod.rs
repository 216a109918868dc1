//! Source-control platform access: status checks, commit snapshots, installation tokens.

use std::sync::Arc;

use async_trait::async_trait;
use checkflow_core::{events::Repository, Conclusion, RepoContext};
use serde::Serialize;
use thiserror::Error;

pub mod github;
pub mod snapshot;

pub use snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("app authentication failed: {0}")]
    Auth(String),
    #[error("archive link missing for {0}")]
    ArchiveLink(String),
    #[error("snapshot extraction failed: {0}")]
    Extract(String),
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
}

/// Check-run status sent with an update.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    InProgress,
    Completed,
}

/// Inline annotation attached to a completed check run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Annotation {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub annotation_level: String,
    pub message: String,
}

impl Annotation {
    /// Warning pinned to the first line of `path`.
    pub fn warning(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            start_line: 1,
            end_line: 1,
            annotation_level: "warning".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// Body of a check-run update.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckRunUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    pub output: CheckRunOutput,
}

impl CheckRunUpdate {
    /// Moves the check to in progress with a summary.
    pub fn in_progress(name: &str, summary: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: Some(CheckStatus::InProgress),
            conclusion: None,
            output: CheckRunOutput {
                title: name.to_string(),
                summary: summary.into(),
                text: None,
                annotations: Vec::new(),
            },
        }
    }

    /// Concludes the check.
    pub fn completed(
        name: &str,
        conclusion: Conclusion,
        summary: impl Into<String>,
        text: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status: Some(CheckStatus::Completed),
            conclusion: Some(conclusion),
            output: CheckRunOutput {
                title: name.to_string(),
                summary: summary.into(),
                text,
                annotations: Vec::new(),
            },
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.output.annotations = annotations;
        self
    }
}

/// Platform client scoped to one installation.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Creates a check run on the commit and returns its handle.
    async fn create_check_run(&self, ctx: &RepoContext, name: &str) -> Result<i64, PlatformError>;

    async fn update_check_run(
        &self,
        ctx: &RepoContext,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<(), PlatformError>;

    /// Time-limited URL of the commit's source archive.
    async fn archive_url(&self, ctx: &RepoContext) -> Result<String, PlatformError>;

    /// Downloads and unpacks the commit's file tree.
    async fn download_snapshot(&self, ctx: &RepoContext) -> Result<Snapshot, PlatformError>;

    /// Repositories the installation can access.
    async fn list_repositories(&self) -> Result<Vec<Repository>, PlatformError>;
}

/// Mints installation-scoped platform clients.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self, installation_id: i64) -> Result<Arc<dyn Platform>, PlatformError>;
}
