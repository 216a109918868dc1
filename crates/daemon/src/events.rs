//! Reactions to decoded webhook events. Failures are logged, never returned.

use checkflow_core::events::{
    translate_check_run, translate_push, InstallationRepositoriesEvent, Repository, Translation,
};

use crate::{
    http::AppState,
    queue::Publisher,
    remote::{
        types::{names, RepositoryType},
        RemoteError, RemoteService,
    },
    webhook::WebhookEvent,
};

pub async fn handle(st: &AppState, event: WebhookEvent) {
    match event {
        WebhookEvent::Push(e) => publish(&st.publisher, translate_push(&e)).await,
        WebhookEvent::CheckRun(e) => publish(&st.publisher, translate_check_run(&e)).await,
        WebhookEvent::InstallationRepositories(e) => {
            installation_repositories(st.remote.as_ref(), &e).await;
        }
    }
}

async fn publish(publisher: &Publisher, translation: Translation) {
    match translation {
        Translation::Check(record) => {
            if let Err(e) = publisher.publish(&record).await {
                tracing::error!(
                    check = %record.display_name(),
                    repo = %record.context.repo,
                    error = %e,
                    "unable to publish check"
                );
            }
        }
        Translation::Ignored(reason) => tracing::info!(%reason, "event ignored"),
    }
}

/// Registers repositories added to an installation. Returns how many were registered.
pub async fn installation_repositories(
    remote: &dyn RemoteService,
    event: &InstallationRepositoriesEvent,
) -> usize {
    let installation_id = event.installation.id;
    match event.action.as_str() {
        "added" => {}
        "removed" => {
            tracing::warn!(
                installation_id,
                repositories = event.repositories_removed.len(),
                "repository removal is not handled"
            );
            return 0;
        }
        other => {
            tracing::debug!(installation_id, action = other, "ignoring installation_repositories action");
            return 0;
        }
    }

    let installation = match remote.get_installation(&names::any_installation(installation_id)).await {
        Ok(installation) => installation,
        Err(RemoteError::NotFound(_)) => {
            tracing::warn!(installation_id, "installation not found");
            return 0;
        }
        Err(e) => {
            tracing::error!(installation_id, error = %e, "error getting installation");
            return 0;
        }
    };
    let Some(project) = installation.project() else {
        tracing::error!(installation_id, name = %installation.name, "installation has no project");
        return 0;
    };

    let fallback_owner = event.installation.account.as_ref().map(|a| a.login.as_str());
    let mut registered = 0;
    for repo in &event.repositories_added {
        match register_repository(remote, project, installation_id, repo, fallback_owner).await {
            Ok(()) => registered += 1,
            Err(e) => {
                tracing::error!(repo = %repo.name, error = %e, "error creating repository");
            }
        }
    }
    tracing::info!(installation_id, %project, registered, "registered added repositories");
    registered
}

/// Registers one platform repository with the project.
pub(crate) async fn register_repository(
    remote: &dyn RemoteService,
    project: &str,
    installation_id: i64,
    repo: &Repository,
    fallback_owner: Option<&str>,
) -> Result<(), RemoteError> {
    let resource = crate::remote::Repository {
        name: String::new(),
        display_name: repo.name.clone(),
        owner: repo
            .owner_login()
            .or(fallback_owner)
            .unwrap_or_default()
            .to_string(),
        default_branch: repo.default_branch.clone().unwrap_or_default(),
        installation: names::installation(project, installation_id),
        repository_type: RepositoryType::Github,
    };
    remote
        .create_repository(&names::project(project), &repo.id.to_string(), &resource)
        .await?;
    Ok(())
}
