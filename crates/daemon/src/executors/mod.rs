//! One executor per check kind. Each drives its own check run and returns follow-ups.

use std::sync::Arc;

use checkflow_core::{manifest::Manifest, CheckKind, CheckRecord};

use crate::{
    cloud::{CredentialSource, ResourceInspector},
    error::{CheckError, StageFailure},
    platform::{Platform, Snapshot},
    remote::ExecutionRunner,
};

mod build;
mod setup;
mod test;
mod validation;

/// Which tests a finished build fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TestFanOut {
    /// Every declared test, whatever the build concluded.
    #[default]
    All,
    /// Tests that reference the completed build, only after it succeeded.
    BuildScoped,
}

pub struct Executors {
    runner: Arc<ExecutionRunner>,
    credentials: Arc<dyn CredentialSource>,
    inspector: Arc<dyn ResourceInspector>,
    fan_out: TestFanOut,
    cloud_project: Option<String>,
}

impl Executors {
    pub fn new(
        runner: Arc<ExecutionRunner>,
        credentials: Arc<dyn CredentialSource>,
        inspector: Arc<dyn ResourceInspector>,
    ) -> Self {
        Self {
            runner,
            credentials,
            inspector,
            fan_out: TestFanOut::default(),
            cloud_project: None,
        }
    }

    pub fn with_fan_out(mut self, fan_out: TestFanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Cloud project handed to the inspector. Without one, the installation's project is used.
    pub fn with_cloud_project(mut self, project: Option<String>) -> Self {
        self.cloud_project = project;
        self
    }

    /// Runs the executor for the record's kind.
    pub async fn execute(
        &self,
        platform: &dyn Platform,
        record: CheckRecord,
    ) -> Result<Vec<CheckRecord>, CheckError> {
        match record.kind.clone() {
            CheckKind::Setup => setup::run(platform, record).await,
            CheckKind::BuildImage { build } => build::run(self, platform, record, &build).await,
            CheckKind::RunTest { test } => test::run(self, platform, record, &test).await,
            CheckKind::ResourceValidation { environment } => {
                validation::run(self, platform, record, &environment).await
            }
        }
    }
}

/// Downloads the commit and reads its manifest; the snapshot is gone when this returns.
async fn fetch_manifest(
    platform: &dyn Platform,
    record: &CheckRecord,
) -> Result<Manifest, FetchError> {
    let snapshot: Snapshot = platform
        .download_snapshot(&record.context)
        .await
        .map_err(|e| FetchError::Download(e.into()))?;
    match Manifest::load(snapshot.root()) {
        Ok(Some(manifest)) => Ok(manifest),
        Ok(None) => Err(FetchError::Manifest(CheckError::MissingManifest)),
        Err(e) => Err(FetchError::Manifest(e.into())),
    }
}

enum FetchError {
    Download(CheckError),
    Manifest(CheckError),
}

impl FetchError {
    /// Picks the check-run summary matching the failed step.
    fn summarize(self, download: &str, manifest: &str) -> StageFailure {
        let (summary, error) = match self {
            Self::Download(error) => (download, error),
            Self::Manifest(error) => (manifest, error),
        };
        StageFailure {
            summary: summary.to_string(),
            error,
        }
    }
}
