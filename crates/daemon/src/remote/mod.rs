//! Remote execution service: resources, executions and the polling runner.

use async_trait::async_trait;
use thiserror::Error;

pub mod connect;
pub mod runner;
pub mod types;

pub use connect::ConnectClient;
pub use runner::{ExecutionRequest, ExecutionRunner, PollPolicy};
pub use types::{Build, Execution, Installation, Repository, Test};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("rpc {code}: {message}")]
    Rpc { code: String, message: String },
    #[error("remote service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("installation name '{0}' has no project")]
    NoProject(String),
}

/// The remote execution service's API.
///
/// `create_*` calls for an id that already exists must either succeed or
/// answer [`RemoteError::AlreadyExists`]; concurrent get-or-create relies on it.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn get_installation(&self, name: &str) -> Result<Installation, RemoteError>;

    async fn create_installation(
        &self,
        parent: &str,
        installation_id: &str,
        installation: &Installation,
    ) -> Result<Installation, RemoteError>;

    async fn create_repository(
        &self,
        parent: &str,
        repository_id: &str,
        repository: &Repository,
    ) -> Result<Repository, RemoteError>;

    async fn get_build(&self, name: &str) -> Result<Build, RemoteError>;

    async fn create_build(&self, parent: &str, build_id: &str, build: &Build)
        -> Result<Build, RemoteError>;

    async fn get_test(&self, name: &str) -> Result<Test, RemoteError>;

    async fn create_test(&self, parent: &str, test_id: &str, test: &Test)
        -> Result<Test, RemoteError>;

    async fn create_execution(
        &self,
        parent: &str,
        execution: &Execution,
    ) -> Result<Execution, RemoteError>;

    async fn get_execution(&self, name: &str) -> Result<Execution, RemoteError>;
}
