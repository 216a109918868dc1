use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use crate::{executors::TestFanOut, queue::PubSubConfig, remote::PollPolicy};

/// Where published checks go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueMode {
    /// Google Cloud Pub/Sub; deliveries come back on `/gcp/pubsub`.
    Pubsub,
    /// In-process channel.
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "checkflow-daemon", about = "Webhook-driven check orchestration")]
pub struct Args {
    /// Listen address.
    #[arg(long, env = "CHECKFLOW_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (env-filter syntax).
    #[arg(long, env = "CHECKFLOW_LOG", default_value = "info")]
    pub log: String,

    /// Shared secret for webhook signatures. Signatures are not checked without it.
    #[arg(long, env = "CHECKFLOW_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    #[arg(long, env = "CHECKFLOW_GITHUB_APP_ID")]
    pub github_app_id: String,

    /// PEM file holding the GitHub App private key.
    #[arg(long, env = "CHECKFLOW_GITHUB_PRIVATE_KEY")]
    pub github_private_key: PathBuf,

    #[arg(long, env = "CHECKFLOW_GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Base URL of the remote execution service.
    #[arg(long, env = "CHECKFLOW_API_URL")]
    pub api_url: String,

    /// Where the setup callback redirects to.
    #[arg(long, env = "CHECKFLOW_SITE_URL", default_value = "http://localhost:3000")]
    pub site_url: String,

    #[arg(long, env = "CHECKFLOW_QUEUE", value_enum, default_value_t = QueueMode::Pubsub)]
    pub queue: QueueMode,

    #[arg(long, env = "CHECKFLOW_PUBSUB_ENDPOINT", default_value = PubSubConfig::DEFAULT_ENDPOINT)]
    pub pubsub_endpoint: String,

    #[arg(long, env = "CHECKFLOW_PUBSUB_PROJECT")]
    pub pubsub_project: Option<String>,

    #[arg(long, env = "CHECKFLOW_PUBSUB_TOPIC", default_value = "github-checks")]
    pub pubsub_topic: String,

    /// Seconds between execution polls.
    #[arg(long, env = "CHECKFLOW_POLL_INTERVAL_SECS", default_value_t = 15)]
    pub poll_interval_secs: u64,

    /// Polls before a build is reported as timed out.
    #[arg(long, env = "CHECKFLOW_BUILD_POLL_BUDGET", default_value_t = PollPolicy::DEFAULT_BUILD_POLLS)]
    pub build_poll_budget: u32,

    #[arg(long, env = "CHECKFLOW_TEST_FAN_OUT", value_enum, default_value_t = TestFanOut::All)]
    pub test_fan_out: TestFanOut,

    /// Resource inspector endpoint. Resource validation fails without it.
    #[arg(long, env = "CHECKFLOW_INSPECTOR_URL")]
    pub inspector_url: Option<String>,

    /// Cloud project handed to the inspector; defaults to the installation's project.
    #[arg(long, env = "CHECKFLOW_CLOUD_PROJECT")]
    pub cloud_project: Option<String>,

    /// Static cloud access token; the metadata server is used without it.
    #[arg(long, env = "CHECKFLOW_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "CHECKFLOW_METADATA_URL", default_value = crate::cloud::MetadataServer::DEFAULT_URL)]
    pub metadata_url: String,
}

/// A value that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub enum QueueConfig {
    PubSub(PubSubConfig),
    Local,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub webhook_secret: Option<Secret>,

    pub github_app_id: String,
    pub github_private_key: PathBuf,
    pub github_api_url: String,

    pub api_url: String,
    pub site_url: String,

    pub queue: QueueConfig,

    pub build_poll: PollPolicy,
    pub test_poll: PollPolicy,
    pub test_fan_out: TestFanOut,

    pub inspector_url: Option<String>,
    pub cloud_project: Option<String>,
    pub access_token: Option<Secret>,
    pub metadata_url: String,
}

impl TryFrom<Args> for DaemonConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        if args.poll_interval_secs == 0 {
            bail!("--poll-interval-secs must be greater than zero");
        }
        if args.build_poll_budget == 0 {
            bail!("--build-poll-budget must be greater than zero");
        }

        let queue = match args.queue {
            QueueMode::Local => QueueConfig::Local,
            QueueMode::Pubsub => QueueConfig::PubSub(PubSubConfig {
                endpoint: args.pubsub_endpoint,
                project: args
                    .pubsub_project
                    .context("--pubsub-project is required with --queue pubsub")?,
                topic: args.pubsub_topic,
            }),
        };

        let interval = Duration::from_secs(args.poll_interval_secs);
        Ok(Self {
            listen: args.listen,
            webhook_secret: args.webhook_secret.filter(|s| !s.is_empty()).map(Secret::new),
            github_app_id: args.github_app_id,
            github_private_key: args.github_private_key,
            github_api_url: args.github_api_url,
            api_url: args.api_url,
            site_url: args.site_url,
            queue,
            build_poll: PollPolicy::bounded(interval, args.build_poll_budget),
            test_poll: PollPolicy::unbounded(interval),
            test_fan_out: args.test_fan_out,
            inspector_url: args.inspector_url,
            cloud_project: args.cloud_project,
            access_token: args.access_token.map(Secret::new),
            metadata_url: args.metadata_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<DaemonConfig> {
        let mut argv = vec![
            "checkflow-daemon",
            "--github-app-id",
            "1234",
            "--github-private-key",
            "/secrets/app.pem",
            "--api-url",
            "http://api.internal",
        ];
        argv.extend_from_slice(extra);
        DaemonConfig::try_from(Args::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_follow_the_polling_contract() {
        let cfg = parse(&["--queue", "local"]).unwrap();
        assert_eq!(cfg.build_poll, PollPolicy::bounded(Duration::from_secs(15), 60));
        assert_eq!(cfg.test_poll.max_polls, None);
        assert_eq!(cfg.test_fan_out, TestFanOut::All);
        assert!(matches!(cfg.queue, QueueConfig::Local));
    }

    #[test]
    fn pubsub_requires_a_project() {
        assert!(parse(&["--queue", "pubsub"]).is_err());
        let cfg = parse(&["--pubsub-project", "acme", "--test-fan-out", "build-scoped"]).unwrap();
        assert!(matches!(cfg.queue, QueueConfig::PubSub(ref p) if p.project == "acme"));
        assert_eq!(cfg.test_fan_out, TestFanOut::BuildScoped);
    }

    #[test]
    fn secrets_are_redacted() {
        let cfg = parse(&["--queue", "local", "--webhook-secret", "hunter2"]).unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
        assert_eq!(cfg.webhook_secret.unwrap().expose(), "hunter2");
    }
}
