//! Runs one build or test on the remote service and waits for its outcome.

use std::{sync::Arc, time::Duration};

use checkflow_core::{
    manifest::{BuildSpec, TestSpec},
    CheckRecord, Conclusion, RepoContext,
};

use super::{
    types::{names, BuildRequest, TestRequest},
    Build, Execution, RemoteError, RemoteService, Test,
};
use crate::{error::CheckError, platform::Platform};

/// How often and how long an execution is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until a terminal state arrives.
    pub max_polls: Option<u32>,
}

impl PollPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
    pub const DEFAULT_BUILD_POLLS: u32 = 60;

    pub fn bounded(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls: Some(max_polls),
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_polls: None,
        }
    }
}

/// What to execute.
#[derive(Debug, Clone, Copy)]
pub enum ExecutionRequest<'a> {
    Build(&'a BuildSpec),
    Test(&'a TestSpec),
}

impl ExecutionRequest<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Test(_) => "test",
        }
    }
}

pub struct ExecutionRunner {
    remote: Arc<dyn RemoteService>,
    build_policy: PollPolicy,
    test_policy: PollPolicy,
}

impl ExecutionRunner {
    pub fn new(remote: Arc<dyn RemoteService>, build_policy: PollPolicy, test_policy: PollPolicy) -> Self {
        Self {
            remote,
            build_policy,
            test_policy,
        }
    }

    /// Executes the build or test for the record's commit and returns its conclusion.
    ///
    /// Builds that do not finish within the build poll budget conclude as
    /// [`Conclusion::TimedOut`].
    pub async fn run(
        &self,
        platform: &dyn Platform,
        record: &CheckRecord,
        request: ExecutionRequest<'_>,
    ) -> Result<Conclusion, CheckError> {
        let ctx = &record.context;
        let project = self.resolve_project(ctx.installation_id).await?;
        let resource = self.ensure_resource(&project, ctx, request).await?;

        let mut execution = Execution {
            branch: ctx.branch.clone(),
            commit: ctx.head_sha.clone(),
            ..Default::default()
        };
        let policy = match request {
            ExecutionRequest::Build(_) => {
                let download = platform.archive_url(ctx).await?;
                execution.build_request = Some(BuildRequest {
                    build: resource,
                    download,
                });
                self.build_policy
            }
            ExecutionRequest::Test(_) => {
                execution.test_request = Some(TestRequest { test: resource });
                self.test_policy
            }
        };

        let created = self
            .remote
            .create_execution(&names::project(&project), &execution)
            .await?;
        tracing::info!(
            check = %record.display_name(),
            execution = %created.name,
            kind = request.label(),
            "execution created"
        );

        Ok(self.poll(&created.name, policy).await?)
    }

    /// Project that owns the installation.
    pub async fn resolve_project(&self, installation_id: i64) -> Result<String, RemoteError> {
        let installation = self
            .remote
            .get_installation(&names::any_installation(installation_id))
            .await?;
        installation
            .project()
            .map(str::to_string)
            .ok_or(RemoteError::NoProject(installation.name))
    }

    /// Fetches the build or test resource, creating it on first use. Returns its resource name.
    ///
    /// Losing a creation race to another check is not an error; the resource exists either way.
    pub async fn ensure_resource(
        &self,
        project: &str,
        ctx: &RepoContext,
        request: ExecutionRequest<'_>,
    ) -> Result<String, RemoteError> {
        let parent = names::project(project);
        let repository = names::repository(project, ctx.repo_id);

        match request {
            ExecutionRequest::Build(spec) => {
                let id = names::build_id(ctx.repo_id, &spec.name);
                let name = names::build(project, &id);
                match self.remote.get_build(&name).await {
                    Ok(found) => Ok(resource_name(found.name, name)),
                    Err(RemoteError::NotFound(_)) => {
                        let build = Build {
                            name: String::new(),
                            display_name: spec.name.clone(),
                            repository,
                            path: spec.path.clone(),
                            file: spec.file.clone(),
                        };
                        tracing::info!(build = %id, "creating build resource");
                        match self.remote.create_build(&parent, &id, &build).await {
                            Ok(created) => Ok(resource_name(created.name, name)),
                            Err(RemoteError::AlreadyExists(_)) => {
                                tracing::debug!(build = %id, "build resource created concurrently");
                                Ok(name)
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            ExecutionRequest::Test(spec) => {
                let id = names::test_id(ctx.repo_id, &spec.name);
                let name = names::test(project, &id);
                match self.remote.get_test(&name).await {
                    Ok(found) => Ok(resource_name(found.name, name)),
                    Err(RemoteError::NotFound(_)) => {
                        let build_id = names::build_id(ctx.repo_id, &spec.build);
                        let test = Test {
                            name: String::new(),
                            display_name: spec.name.clone(),
                            repository,
                            build: names::build(project, &build_id),
                            command: spec.command.clone(),
                        };
                        tracing::info!(test = %id, "creating test resource");
                        match self.remote.create_test(&parent, &id, &test).await {
                            Ok(created) => Ok(resource_name(created.name, name)),
                            Err(RemoteError::AlreadyExists(_)) => {
                                tracing::debug!(test = %id, "test resource created concurrently");
                                Ok(name)
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn poll(&self, name: &str, policy: PollPolicy) -> Result<Conclusion, RemoteError> {
        let mut polls: u32 = 0;
        loop {
            let execution = self.remote.get_execution(name).await?;
            polls += 1;
            tracing::debug!(execution = name, polls, state = ?execution.state, "polled execution");

            if let Some(conclusion) = execution.state.conclusion() {
                return Ok(conclusion);
            }
            if policy.max_polls.is_some_and(|max| polls >= max) {
                tracing::warn!(execution = name, polls, "execution did not finish in time");
                return Ok(Conclusion::TimedOut);
            }
            tokio::time::sleep(policy.interval).await;
        }
    }
}

/// Prefers the name the service reports, falling back to the derived one.
fn resource_name(reported: String, derived: String) -> String {
    if reported.is_empty() {
        derived
    } else {
        reported
    }
}
