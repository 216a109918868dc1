//! Connect-protocol JSON client for `phantom.api.v1.GitService`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{Build, Execution, Installation, RemoteError, RemoteService, Repository, Test};

const SERVICE: &str = "phantom.api.v1.GitService";

#[derive(Debug, Clone)]
pub struct ConnectClient {
    base: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ConnectError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ByName<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstallationRequest<'a> {
    parent: &'a str,
    installation_id: &'a str,
    installation: &'a Installation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRepositoryRequest<'a> {
    parent: &'a str,
    repository_id: &'a str,
    repository: &'a Repository,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBuildRequest<'a> {
    parent: &'a str,
    build_id: &'a str,
    build: &'a Build,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTestRequest<'a> {
    parent: &'a str,
    test_id: &'a str,
    test: &'a Test,
}

#[derive(Serialize)]
struct CreateExecutionRequest<'a> {
    parent: &'a str,
    execution: &'a Execution,
}

impl ConnectClient {
    pub fn new(base: &str) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn call<Req, Res>(&self, method: &str, req: &Req) -> Result<Res, RemoteError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = format!("{}/{SERVICE}/{method}", self.base);
        let res = self.http.post(url).json(req).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res.json().await?);
        }

        let text = res.text().await.unwrap_or_default();
        let err: ConnectError = serde_json::from_str(&text).unwrap_or(ConnectError {
            code: String::new(),
            message: text,
        });
        tracing::debug!(method, status = status.as_u16(), code = %err.code, "rpc failed");
        Err(classify(status.as_u16(), err))
    }
}

fn classify(status: u16, err: ConnectError) -> RemoteError {
    match err.code.as_str() {
        "not_found" => RemoteError::NotFound(err.message),
        "already_exists" => RemoteError::AlreadyExists(err.message),
        "" if status == 404 => RemoteError::NotFound(err.message),
        "" if status == 409 => RemoteError::AlreadyExists(err.message),
        "" => RemoteError::Rpc {
            code: format!("http_{status}"),
            message: err.message,
        },
        code => RemoteError::Rpc {
            code: code.to_string(),
            message: err.message,
        },
    }
}

#[async_trait]
impl RemoteService for ConnectClient {
    async fn get_installation(&self, name: &str) -> Result<Installation, RemoteError> {
        self.call("GetInstallation", &ByName { name }).await
    }

    async fn create_installation(
        &self,
        parent: &str,
        installation_id: &str,
        installation: &Installation,
    ) -> Result<Installation, RemoteError> {
        let req = CreateInstallationRequest {
            parent,
            installation_id,
            installation,
        };
        self.call("CreateInstallation", &req).await
    }

    async fn create_repository(
        &self,
        parent: &str,
        repository_id: &str,
        repository: &Repository,
    ) -> Result<Repository, RemoteError> {
        let req = CreateRepositoryRequest {
            parent,
            repository_id,
            repository,
        };
        self.call("CreateRepository", &req).await
    }

    async fn get_build(&self, name: &str) -> Result<Build, RemoteError> {
        self.call("GetBuild", &ByName { name }).await
    }

    async fn create_build(
        &self,
        parent: &str,
        build_id: &str,
        build: &Build,
    ) -> Result<Build, RemoteError> {
        let req = CreateBuildRequest {
            parent,
            build_id,
            build,
        };
        self.call("CreateBuild", &req).await
    }

    async fn get_test(&self, name: &str) -> Result<Test, RemoteError> {
        self.call("GetTest", &ByName { name }).await
    }

    async fn create_test(&self, parent: &str, test_id: &str, test: &Test) -> Result<Test, RemoteError> {
        let req = CreateTestRequest {
            parent,
            test_id,
            test,
        };
        self.call("CreateTest", &req).await
    }

    async fn create_execution(
        &self,
        parent: &str,
        execution: &Execution,
    ) -> Result<Execution, RemoteError> {
        self.call("CreateExecution", &CreateExecutionRequest { parent, execution })
            .await
    }

    async fn get_execution(&self, name: &str) -> Result<Execution, RemoteError> {
        self.call("GetExecution", &ByName { name }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: &str) -> ConnectError {
        ConnectError {
            code: code.into(),
            message: "m".into(),
        }
    }

    #[test]
    fn classifies_connect_codes() {
        assert!(matches!(classify(404, err("not_found")), RemoteError::NotFound(_)));
        assert!(matches!(
            classify(409, err("already_exists")),
            RemoteError::AlreadyExists(_)
        ));
        assert!(matches!(classify(404, err("")), RemoteError::NotFound(_)));
        match classify(500, err("internal")) {
            RemoteError::Rpc { code, .. } => assert_eq!(code, "internal"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
