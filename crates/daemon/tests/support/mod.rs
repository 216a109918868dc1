#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use checkflow_core::{
    events::Repository as PlatformRepository, manifest::EnvironmentSpec, CheckRecord,
    ExecutionState, RepoContext,
};
use checkflow_daemon::{
    cloud::{CredentialError, CredentialSource, InspectorError, ResourceInspector, ResourceStatus},
    dispatcher::Dispatcher,
    executors::{Executors, TestFanOut},
    platform::{CheckRunUpdate, Platform, PlatformConnector, PlatformError, Snapshot},
    queue::{Publisher, QueueError, QueueTransport},
    remote::{
        Build, Execution, ExecutionRunner, Installation, PollPolicy, RemoteError, RemoteService,
        Repository, Test,
    },
};

pub const PROJECT: &str = "acme";
pub const INSTALLATION_ID: i64 = 77;

pub const MANIFEST: &str = r#"
builds:
  - name: api
    path: services/api
  - name: web
tests:
  - name: api-unit
    build: api
    command: cargo test
  - name: web-e2e
    build: web
    command: npm test
environments:
  - environment: prod
    resources:
      - type: bucket
        name: assets
"#;

pub fn context() -> RepoContext {
    RepoContext {
        owner: "octo".into(),
        repo: "shop".into(),
        head_sha: "abc123".into(),
        branch: "main".into(),
        default_branch: "main".into(),
        installation_id: INSTALLATION_ID,
        repo_id: 42,
    }
}

/// Platform double: serves a fixed manifest and records every check-run call.
pub struct FakePlatform {
    manifest: Option<String>,
    download_fails: bool,
    next_id: AtomicI64,
    pub created: Mutex<Vec<(i64, String)>>,
    pub updates: Mutex<Vec<(i64, CheckRunUpdate)>>,
    pub repositories: Vec<PlatformRepository>,
}

impl FakePlatform {
    pub fn with_manifest(manifest: &str) -> Arc<Self> {
        Arc::new(Self::new(Some(manifest.to_string())))
    }

    pub fn without_manifest() -> Arc<Self> {
        Arc::new(Self::new(None))
    }

    pub fn with_repositories(repositories: Vec<PlatformRepository>) -> Arc<Self> {
        Arc::new(Self {
            repositories,
            ..Self::new(None)
        })
    }

    /// Every snapshot download answers 502.
    pub fn with_broken_download() -> Arc<Self> {
        Arc::new(Self {
            download_fails: true,
            ..Self::new(None)
        })
    }

    fn new(manifest: Option<String>) -> Self {
        Self {
            manifest,
            download_fails: false,
            next_id: AtomicI64::new(1000),
            created: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            repositories: Vec::new(),
        }
    }

    /// The last update sent for the check run with this name.
    pub fn last_update(&self, name: &str) -> Option<CheckRunUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, u)| u.name == name)
            .map(|(_, u)| u.clone())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn create_check_run(&self, _ctx: &RepoContext, name: &str) -> Result<i64, PlatformError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push((id, name.to_string()));
        Ok(id)
    }

    async fn update_check_run(
        &self,
        _ctx: &RepoContext,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<(), PlatformError> {
        self.updates
            .lock()
            .unwrap()
            .push((check_run_id, update.clone()));
        Ok(())
    }

    async fn archive_url(&self, ctx: &RepoContext) -> Result<String, PlatformError> {
        Ok(format!("https://archive.test/{}/{}/{}.zip", ctx.owner, ctx.repo, ctx.head_sha))
    }

    async fn download_snapshot(&self, _ctx: &RepoContext) -> Result<Snapshot, PlatformError> {
        if self.download_fails {
            return Err(PlatformError::Api {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        let dir = tempfile::tempdir()?;
        if let Some(manifest) = &self.manifest {
            std::fs::write(dir.path().join("phantom.yaml"), manifest)?;
        }
        Ok(Snapshot::from_dir(dir))
    }

    async fn list_repositories(&self) -> Result<Vec<PlatformRepository>, PlatformError> {
        Ok(self.repositories.clone())
    }
}

pub struct FakeConnector {
    pub platform: Arc<FakePlatform>,
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect(&self, _installation_id: i64) -> Result<Arc<dyn Platform>, PlatformError> {
        let platform: Arc<dyn Platform> = self.platform.clone();
        Ok(platform)
    }
}

/// Remote service double. Executions walk through a scripted list of states;
/// the last one repeats forever.
#[derive(Default)]
pub struct FakeRemote {
    pub builds: Mutex<HashMap<String, Build>>,
    pub tests: Mutex<HashMap<String, Test>>,
    pub repositories: Mutex<Vec<(String, String, Repository)>>,
    pub installations: Mutex<Vec<(String, String)>>,
    pub executions: Mutex<Vec<Execution>>,
    pub build_creates: AtomicUsize,
    pub test_creates: AtomicUsize,
    pub polls: AtomicUsize,
    script: Mutex<VecDeque<ExecutionState>>,
    installation_exists: bool,
    /// Every create answers `AlreadyExists`, as if another check got there first.
    loses_create_race: bool,
}

impl FakeRemote {
    pub fn finishing_with(states: &[ExecutionState]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(states.iter().copied().collect()),
            ..Default::default()
        })
    }

    pub fn losing_create_race(states: &[ExecutionState]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(states.iter().copied().collect()),
            loses_create_race: true,
            ..Default::default()
        })
    }

    pub fn with_existing_installation() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::from([ExecutionState::Success])),
            installation_exists: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn get_installation(&self, name: &str) -> Result<Installation, RemoteError> {
        let id = name.rsplit('/').next().unwrap_or_default();
        Ok(Installation {
            name: format!("projects/{PROJECT}/installations/{id}"),
        })
    }

    async fn create_installation(
        &self,
        parent: &str,
        installation_id: &str,
        _installation: &Installation,
    ) -> Result<Installation, RemoteError> {
        if self.installation_exists {
            return Err(RemoteError::AlreadyExists(installation_id.to_string()));
        }
        self.installations
            .lock()
            .unwrap()
            .push((parent.to_string(), installation_id.to_string()));
        Ok(Installation {
            name: format!("{parent}/installations/{installation_id}"),
        })
    }

    async fn create_repository(
        &self,
        parent: &str,
        repository_id: &str,
        repository: &Repository,
    ) -> Result<Repository, RemoteError> {
        self.repositories.lock().unwrap().push((
            parent.to_string(),
            repository_id.to_string(),
            repository.clone(),
        ));
        Ok(repository.clone())
    }

    async fn get_build(&self, name: &str) -> Result<Build, RemoteError> {
        self.builds
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    async fn create_build(
        &self,
        parent: &str,
        build_id: &str,
        build: &Build,
    ) -> Result<Build, RemoteError> {
        self.build_creates.fetch_add(1, Ordering::SeqCst);
        if self.loses_create_race {
            return Err(RemoteError::AlreadyExists(build_id.to_string()));
        }
        let name = format!("{parent}/builds/{build_id}");
        let created = Build {
            name: name.clone(),
            ..build.clone()
        };
        self.builds.lock().unwrap().insert(name, created.clone());
        Ok(created)
    }

    async fn get_test(&self, name: &str) -> Result<Test, RemoteError> {
        self.tests
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    async fn create_test(
        &self,
        parent: &str,
        test_id: &str,
        test: &Test,
    ) -> Result<Test, RemoteError> {
        self.test_creates.fetch_add(1, Ordering::SeqCst);
        if self.loses_create_race {
            return Err(RemoteError::AlreadyExists(test_id.to_string()));
        }
        let name = format!("{parent}/tests/{test_id}");
        let created = Test {
            name: name.clone(),
            ..test.clone()
        };
        self.tests.lock().unwrap().insert(name, created.clone());
        Ok(created)
    }

    async fn create_execution(
        &self,
        parent: &str,
        execution: &Execution,
    ) -> Result<Execution, RemoteError> {
        let mut executions = self.executions.lock().unwrap();
        let created = Execution {
            name: format!("{parent}/executions/{}", executions.len() + 1),
            ..execution.clone()
        };
        executions.push(created.clone());
        Ok(created)
    }

    async fn get_execution(&self, name: &str) -> Result<Execution, RemoteError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let state = if script.len() > 1 {
            script.pop_front().unwrap_or_default()
        } else {
            script.front().copied().unwrap_or_default()
        };
        Ok(Execution {
            name: name.to_string(),
            state,
            ..Default::default()
        })
    }
}

pub struct FakeCredentials;

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn access_token(&self) -> Result<String, CredentialError> {
        Ok("token-123".into())
    }
}

pub struct FailingCredentials;

#[async_trait]
impl CredentialSource for FailingCredentials {
    async fn access_token(&self) -> Result<String, CredentialError> {
        Err(CredentialError::Status(503))
    }
}

/// Reports declared resources as present and up to date unless listed as missing.
#[derive(Default)]
pub struct FakeInspector {
    pub calls: Mutex<Vec<(String, String, String)>>,
    /// Resource names reported as not existing.
    pub missing: Vec<String>,
}

impl FakeInspector {
    pub fn missing(names: &[&str]) -> Self {
        Self {
            missing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ResourceInspector for FakeInspector {
    async fn inspect(
        &self,
        project: &str,
        environment: &EnvironmentSpec,
        token: &str,
    ) -> Result<Vec<ResourceStatus>, InspectorError> {
        self.calls.lock().unwrap().push((
            project.to_string(),
            environment.environment.clone(),
            token.to_string(),
        ));
        Ok(environment
            .resources
            .iter()
            .map(|r| {
                let exists = !self.missing.contains(&r.name);
                ResourceStatus {
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                    exists,
                    requires_update: !exists,
                }
            })
            .collect())
    }
}

/// Keeps published payloads; optionally rejects every publish.
#[derive(Default)]
pub struct RecordingTransport {
    pub published: Mutex<Vec<Vec<u8>>>,
    pub reject: bool,
}

impl RecordingTransport {
    pub fn records(&self) -> Vec<CheckRecord> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|p| checkflow_daemon::queue::consume(p).unwrap())
            .collect()
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError> {
        if self.reject {
            return Err(QueueError::Rejected {
                status: 503,
                body: "topic closed".into(),
            });
        }
        let mut published = self.published.lock().unwrap();
        published.push(payload);
        Ok(format!("msg-{}", published.len()))
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy::bounded(Duration::from_millis(1), PollPolicy::DEFAULT_BUILD_POLLS)
}

pub fn executors(remote: Arc<FakeRemote>, fan_out: TestFanOut) -> Executors {
    let runner = Arc::new(ExecutionRunner::new(
        remote,
        fast_poll(),
        PollPolicy::unbounded(Duration::from_millis(1)),
    ));
    Executors::new(
        runner,
        Arc::new(FakeCredentials),
        Arc::new(FakeInspector::default()),
    )
    .with_fan_out(fan_out)
}

pub fn dispatcher(
    platform: Arc<FakePlatform>,
    remote: Arc<FakeRemote>,
    transport: Arc<RecordingTransport>,
) -> Dispatcher {
    Dispatcher::new(
        Arc::new(FakeConnector { platform }),
        executors(remote, TestFanOut::BuildScoped),
        Publisher::new(transport),
    )
}
