//! Assembles the daemon from its configuration.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::task::JoinHandle;

use crate::{
    cloud::{CredentialSource, HttpInspector, MetadataServer, ResourceInspector, StaticToken, Unconfigured},
    config::{DaemonConfig, QueueConfig},
    dispatcher::Dispatcher,
    executors::Executors,
    http::{router, AppState},
    platform::{github::GithubApp, PlatformConnector},
    queue::{local, LocalTransport, PubSubTransport, Publisher, QueueTransport},
    remote::{ConnectClient, ExecutionRunner, RemoteService},
    supervisor::{spawn_report_logger, Supervisor},
};

/// The running pieces of the daemon.
pub struct Service {
    pub router: Router,
    pub background: Vec<JoinHandle<()>>,
}

/// External collaborators, built from configuration or supplied by tests.
pub struct Collaborators {
    pub connector: Arc<dyn PlatformConnector>,
    pub remote: Arc<dyn RemoteService>,
    pub credentials: Arc<dyn CredentialSource>,
    pub inspector: Arc<dyn ResourceInspector>,
}

impl Collaborators {
    pub async fn from_config(config: &DaemonConfig) -> anyhow::Result<Self> {
        let pem = tokio::fs::read(&config.github_private_key)
            .await
            .with_context(|| format!("reading {}", config.github_private_key.display()))?;
        let connector = GithubApp::new(&config.github_api_url, &config.github_app_id, &pem)?;
        let remote = ConnectClient::new(&config.api_url)?;

        let credentials: Arc<dyn CredentialSource> = match &config.access_token {
            Some(token) => Arc::new(StaticToken::new(token.expose())),
            None => Arc::new(MetadataServer::new(&config.metadata_url)?),
        };
        let inspector: Arc<dyn ResourceInspector> = match &config.inspector_url {
            Some(url) => Arc::new(HttpInspector::new(url)?),
            None => {
                tracing::warn!("no resource inspector configured; resource validation will fail");
                Arc::new(Unconfigured)
            }
        };

        Ok(Self {
            connector: Arc::new(connector),
            remote: Arc::new(remote),
            credentials,
            inspector,
        })
    }
}

impl Service {
    /// Wires queue, dispatcher, supervisor and router. Must run inside a tokio runtime.
    pub fn build(config: &DaemonConfig, parts: Collaborators) -> anyhow::Result<Self> {
        let mut background = Vec::new();

        let (transport, local_rx): (Arc<dyn QueueTransport>, _) = match &config.queue {
            QueueConfig::PubSub(pubsub) => (
                Arc::new(PubSubTransport::new(pubsub.clone(), Arc::clone(&parts.credentials))?),
                None,
            ),
            QueueConfig::Local => {
                let (transport, rx) = LocalTransport::channel();
                (Arc::new(transport), Some(rx))
            }
        };
        let publisher = Publisher::new(transport);

        let runner = Arc::new(ExecutionRunner::new(
            Arc::clone(&parts.remote),
            config.build_poll,
            config.test_poll,
        ));
        let executors = Executors::new(runner, parts.credentials, parts.inspector)
            .with_fan_out(config.test_fan_out)
            .with_cloud_project(config.cloud_project.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&parts.connector),
            executors,
            publisher.clone(),
        ));

        let (supervisor, reports) = Supervisor::new(dispatcher);
        let supervisor = Arc::new(supervisor);
        background.push(spawn_report_logger(reports));
        if let Some(rx) = local_rx {
            background.push(local::spawn_consumer(rx, Arc::clone(&supervisor)));
        }

        if config.webhook_secret.is_none() {
            tracing::warn!("no webhook secret configured; webhook signatures are not verified");
        }

        let state = AppState {
            publisher,
            supervisor,
            connector: parts.connector,
            remote: parts.remote,
            webhook_secret: config.webhook_secret.clone(),
            site_url: config.site_url.clone(),
        };
        Ok(Self {
            router: router(state),
            background,
        })
    }
}
