//! GitHub App client over the REST API.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use checkflow_core::{events::Repository, RepoContext};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{CheckRunUpdate, Platform, PlatformConnector, PlatformError, Snapshot};

const USER_AGENT: &str = "checkflow-daemon";
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// GitHub App credentials; mints installation clients on demand.
pub struct GithubApp {
    api_base: String,
    app_id: String,
    key: EncodingKey,
    http: Client,
    no_redirect: Client,
}

impl std::fmt::Debug for GithubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubApp")
            .field("api_base", &self.api_base)
            .field("app_id", &self.app_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunCreated {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    repositories: Vec<Repository>,
}

#[derive(Debug, Serialize)]
struct CreateCheckRun<'a> {
    name: &'a str,
    head_sha: &'a str,
}

impl GithubApp {
    /// Builds the app from its id and PEM-encoded RSA private key.
    pub fn new(api_base: &str, app_id: &str, private_key_pem: &[u8]) -> Result<Self, PlatformError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| PlatformError::Auth(format!("invalid app private key: {e}")))?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        let no_redirect = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            key,
            http,
            no_redirect,
        })
    }

    /// Short-lived JWT identifying the app itself.
    fn app_jwt(&self) -> Result<String, PlatformError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let claims = AppClaims {
            // backdated to absorb clock drift
            iat: now.saturating_sub(60),
            exp: now + 600,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| PlatformError::Auth(format!("failed to sign app token: {e}")))
    }
}

#[async_trait]
impl PlatformConnector for GithubApp {
    async fn connect(&self, installation_id: i64) -> Result<Arc<dyn Platform>, PlatformError> {
        let jwt = self.app_jwt()?;
        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.api_base
        );
        let res = self
            .http
            .post(url)
            .bearer_auth(jwt)
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;
        let token: InstallationToken = ok(res).await?.json().await?;

        tracing::debug!(installation_id, "minted installation token");
        Ok(Arc::new(GithubClient {
            api_base: self.api_base.clone(),
            token: token.token,
            http: self.http.clone(),
            no_redirect: self.no_redirect.clone(),
        }))
    }
}

/// Installation-scoped client.
pub struct GithubClient {
    api_base: String,
    token: String,
    http: Client,
    no_redirect: Client,
}

impl GithubClient {
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn repo_url(&self, ctx: &RepoContext, tail: &str) -> String {
        format!("{}/repos/{}/{}/{tail}", self.api_base, ctx.owner, ctx.repo)
    }
}

async fn ok(res: Response) -> Result<Response, PlatformError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(PlatformError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Platform for GithubClient {
    async fn create_check_run(&self, ctx: &RepoContext, name: &str) -> Result<i64, PlatformError> {
        let body = CreateCheckRun {
            name,
            head_sha: &ctx.head_sha,
        };
        let res = self
            .authed(self.http.post(self.repo_url(ctx, "check-runs")))
            .json(&body)
            .send()
            .await?;
        let created: CheckRunCreated = ok(res).await?.json().await?;
        Ok(created.id)
    }

    async fn update_check_run(
        &self,
        ctx: &RepoContext,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<(), PlatformError> {
        let url = self.repo_url(ctx, &format!("check-runs/{check_run_id}"));
        let res = self.authed(self.http.patch(url)).json(update).send().await?;
        ok(res).await?;
        Ok(())
    }

    async fn archive_url(&self, ctx: &RepoContext) -> Result<String, PlatformError> {
        let url = self.repo_url(ctx, &format!("zipball/{}", ctx.head_sha));
        let res = self.authed(self.no_redirect.get(url)).send().await?;
        if !res.status().is_redirection() {
            ok(res).await?;
            return Err(PlatformError::ArchiveLink(ctx.head_sha.clone()));
        }
        res.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::ArchiveLink(ctx.head_sha.clone()))
    }

    async fn download_snapshot(&self, ctx: &RepoContext) -> Result<Snapshot, PlatformError> {
        let link = self.archive_url(ctx).await?;
        tracing::debug!(repo = %ctx.repo, sha = %ctx.head_sha, "downloading commit archive");
        let res = self.http.get(link).send().await?;
        let bytes = ok(res).await?.bytes().await?;

        tokio::task::spawn_blocking(move || Snapshot::from_zip(&bytes))
            .await
            .map_err(|e| PlatformError::Extract(e.to_string()))?
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, PlatformError> {
        let mut repos = Vec::new();
        for page in 1.. {
            let url = format!(
                "{}/installation/repositories?per_page=100&page={page}",
                self.api_base
            );
            let res = self.authed(self.http.get(url)).send().await?;
            if res.status() == StatusCode::NOT_FOUND {
                break;
            }
            let batch: RepositoryPage = ok(res).await?.json().await?;
            let done = batch.repositories.len() < 100;
            repos.extend(batch.repositories);
            if done {
                break;
            }
        }
        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_key() {
        let err = GithubApp::new("https://api.github.com", "1", b"not a pem").unwrap_err();
        assert!(matches!(err, PlatformError::Auth(_)));
    }

    #[test]
    fn check_run_update_serializes_like_the_rest_api() {
        let update = CheckRunUpdate::completed(
            "Build Image - api",
            checkflow_core::Conclusion::TimedOut,
            "Docker build completed with status 'timed_out'.",
            None,
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["conclusion"], "timed_out");
        assert_eq!(json["output"]["title"], "Build Image - api");
        assert!(json["output"].get("text").is_none());
        assert!(json["output"].get("annotations").is_none());
    }
}
