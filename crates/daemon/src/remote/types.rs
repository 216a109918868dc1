//! Resources of the remote execution service, as they appear on the wire.

use checkflow_core::ExecutionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(default)]
    pub name: String,
}

impl Installation {
    /// Project segment of `projects/<project>/installations/<id>`.
    pub fn project(&self) -> Option<&str> {
        let mut parts = self.name.split('/');
        match (parts.next(), parts.next()) {
            (Some("projects"), Some(project)) if !project.is_empty() && project != "-" => {
                Some(project)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RepositoryType {
    #[default]
    #[serde(rename = "REPOSITORY_TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "REPOSITORY_TYPE_GITHUB")]
    Github,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    pub display_name: String,
    pub owner: String,
    pub default_branch: String,
    pub installation: String,
    #[serde(default)]
    pub repository_type: RepositoryType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default)]
    pub name: String,
    pub display_name: String,
    pub repository: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default)]
    pub name: String,
    pub display_name: String,
    pub repository: String,
    pub build: String,
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub build: String,
    pub download: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub test: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_request: Option<BuildRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_request: Option<TestRequest>,
    #[serde(default)]
    pub state: ExecutionState,
}

/// Resource names under a project.
pub mod names {
    pub fn project(project: &str) -> String {
        format!("projects/{project}")
    }

    /// Installation lookup that does not know the project yet.
    pub fn any_installation(installation_id: i64) -> String {
        format!("projects/-/installations/{installation_id}")
    }

    pub fn installation(project: &str, installation_id: i64) -> String {
        format!("projects/{project}/installations/{installation_id}")
    }

    pub fn repository(project: &str, repo_id: i64) -> String {
        format!("projects/{project}/repositories/{repo_id}")
    }

    pub fn build_id(repo_id: i64, build: &str) -> String {
        format!("build-{repo_id}-{build}")
    }

    pub fn test_id(repo_id: i64, test: &str) -> String {
        format!("test-{repo_id}-{test}")
    }

    pub fn build(project: &str, build_id: &str) -> String {
        format!("projects/{project}/builds/{build_id}")
    }

    pub fn test(project: &str, test_id: &str) -> String {
        format!("projects/{project}/tests/{test_id}")
    }
}
