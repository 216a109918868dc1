//! Platform webhook payloads and their translation into check records.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! payload is ignored by serde.

use serde::Deserialize;

use crate::{
    check::{CheckKind, CheckRecord, RepoContext},
    naming,
};

/// Ref prefix stripped from push refs to get the branch name.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Action of a check-run event that asks for the check to run again.
pub const RERUN_ACTION: &str = "rerequested";

/// User or organization.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// Login name.
    pub login: String,
}

/// Repository as embedded in event payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Platform repository id.
    pub id: i64,
    /// Short name.
    pub name: String,
    /// `owner/name`, when sent.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Owning account, when sent.
    #[serde(default)]
    pub owner: Option<Account>,
    /// Default branch, when sent.
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// App installation the event was delivered for.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    /// Installation id.
    pub id: i64,
    /// Account the app is installed on.
    #[serde(default)]
    pub account: Option<Account>,
}

/// Commit reference in a push.
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    /// Commit SHA.
    pub id: String,
}

/// `push` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    /// Full ref that was pushed.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit the ref now points at; absent for deletions.
    #[serde(default)]
    pub head_commit: Option<Commit>,
    /// Repository pushed to.
    pub repository: Repository,
    /// Installation the delivery belongs to.
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// Suite a check run belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckSuite {
    /// Branch the suite ran on.
    #[serde(default)]
    pub head_branch: Option<String>,
}

/// Check run as embedded in a `check_run` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    /// Check-run id.
    pub id: i64,
    /// Display name, e.g. `Build Image - api`.
    pub name: String,
    /// Commit the check ran on.
    pub head_sha: String,
    /// Owning suite.
    #[serde(default)]
    pub check_suite: Option<CheckSuite>,
}

/// `check_run` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunEvent {
    /// Event action, e.g. `rerequested`.
    pub action: String,
    /// The check run acted on.
    pub check_run: CheckRun,
    /// Repository of the check run.
    pub repository: Repository,
    /// Installation the delivery belongs to.
    #[serde(default)]
    pub installation: Option<Installation>,
}

/// `installation_repositories` event.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationRepositoriesEvent {
    /// `added` or `removed`.
    pub action: String,
    /// Installation whose repository selection changed.
    pub installation: Installation,
    /// Repositories now visible to the app.
    #[serde(default)]
    pub repositories_added: Vec<Repository>,
    /// Repositories no longer visible to the app.
    #[serde(default)]
    pub repositories_removed: Vec<Repository>,
}

/// Result of translating an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// The event starts a check.
    Check(CheckRecord),
    /// The event is dropped; the string says why.
    Ignored(String),
}

impl Repository {
    /// Owner login, falling back to the `owner/` prefix of the full name.
    pub fn owner_login(&self) -> Option<&str> {
        self.owner
            .as_ref()
            .map(|o| o.login.as_str())
            .or_else(|| self.full_name.as_deref()?.split_once('/').map(|(owner, _)| owner))
    }
}

/// Branch name of a ref; refs outside `refs/heads/` are kept whole.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

fn context(
    repository: &Repository,
    installation: &Installation,
    head_sha: String,
    branch: String,
) -> RepoContext {
    let owner = repository
        .owner_login()
        .or_else(|| installation.account.as_ref().map(|a| a.login.as_str()))
        .unwrap_or_default();
    RepoContext {
        owner: owner.to_string(),
        repo: repository.name.clone(),
        head_sha,
        branch,
        default_branch: repository.default_branch.clone().unwrap_or_default(),
        installation_id: installation.id,
        repo_id: repository.id,
    }
}

/// Turns a push into a Setup check for the pushed commit.
pub fn translate_push(event: &PushEvent) -> Translation {
    let Some(head) = &event.head_commit else {
        return Translation::Ignored(format!("push to {} has no head commit", event.git_ref));
    };
    let Some(installation) = &event.installation else {
        return Translation::Ignored("push carries no installation".into());
    };

    let branch = branch_from_ref(&event.git_ref).to_string();
    Translation::Check(CheckRecord::setup(context(
        &event.repository,
        installation,
        head.id.clone(),
        branch,
    )))
}

/// Turns a re-run request into a fresh check of the kind named by the check run.
pub fn translate_check_run(event: &CheckRunEvent) -> Translation {
    if event.action != RERUN_ACTION {
        return Translation::Ignored(format!(
            "check run {} action '{}' is not a re-run",
            event.check_run.id, event.action
        ));
    }
    let Some(installation) = &event.installation else {
        return Translation::Ignored("check run carries no installation".into());
    };
    let kind: CheckKind = match naming::parse_check_name(&event.check_run.name) {
        Ok(kind) => kind,
        Err(e) => return Translation::Ignored(e.to_string()),
    };

    let branch = event
        .check_run
        .check_suite
        .as_ref()
        .and_then(|s| s.head_branch.clone())
        .unwrap_or_default();
    let ctx = context(
        &event.repository,
        installation,
        event.check_run.head_sha.clone(),
        branch,
    );
    Translation::Check(CheckRecord::new(kind, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(git_ref: &str, head: Option<&str>) -> PushEvent {
        serde_json::from_value(serde_json::json!({
            "ref": git_ref,
            "head_commit": head.map(|id| serde_json::json!({ "id": id })),
            "repository": {
                "id": 42,
                "name": "shop",
                "full_name": "acme/shop",
                "owner": { "login": "acme" },
                "default_branch": "main"
            },
            "installation": { "id": 7 }
        }))
        .unwrap()
    }

    #[test]
    fn push_becomes_setup_on_the_branch() {
        let Translation::Check(record) = translate_push(&push("refs/heads/feature/login", Some("abc")))
        else {
            panic!("expected a check");
        };
        assert_eq!(record.kind, CheckKind::Setup);
        assert_eq!(record.context.branch, "feature/login");
        assert_eq!(record.context.head_sha, "abc");
        assert_eq!(record.context.owner, "acme");
        assert_eq!(record.context.installation_id, 7);
        assert_eq!(record.context.repo_id, 42);
        assert_eq!(record.check_run_id(), None);
    }

    #[test]
    fn branch_deletion_is_ignored() {
        assert!(matches!(
            translate_push(&push("refs/heads/gone", None)),
            Translation::Ignored(_)
        ));
    }

    #[test]
    fn tag_refs_keep_their_full_name() {
        assert_eq!(branch_from_ref("refs/tags/v1"), "refs/tags/v1");
        assert_eq!(branch_from_ref("refs/heads/main"), "main");
    }

    #[test]
    fn owner_falls_back_to_full_name() {
        let repo: Repository = serde_json::from_value(serde_json::json!({
            "id": 1, "name": "shop", "full_name": "acme/shop"
        }))
        .unwrap();
        assert_eq!(repo.owner_login(), Some("acme"));
    }
}
