//! `GET /github/setup`: post-installation callback of the GitHub App.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    error::AppError,
    events::register_repository,
    http::AppState,
    remote::{types::names, Installation, RemoteError},
};

#[derive(Debug, Deserialize)]
pub struct SetupQuery {
    installation_id: Option<String>,
    /// Project the installation belongs to.
    state: Option<String>,
}

fn redirect(to: &str) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, to.to_string())]).into_response()
}

pub async fn github_setup(
    State(st): State<AppState>,
    Query(q): Query<SetupQuery>,
) -> Result<Response, AppError> {
    let Some(raw_id) = q.installation_id.filter(|s| !s.is_empty()) else {
        tracing::info!("setup callback without installation_id");
        return Ok((StatusCode::BAD_REQUEST, "Missing installation_id parameter").into_response());
    };
    let Some(project) = q.state.filter(|s| !s.is_empty()) else {
        tracing::info!("setup callback without state");
        return Ok(redirect(&st.site_url));
    };
    let Ok(installation_id) = raw_id.parse::<i64>() else {
        tracing::warn!(installation_id = %raw_id, "invalid installation_id");
        return Ok((StatusCode::BAD_REQUEST, "Invalid installation_id parameter").into_response());
    };

    let platform = st.connector.connect(installation_id).await?;
    let repos = platform.list_repositories().await?;

    match st
        .remote
        .create_installation(&names::project(&project), &raw_id, &Installation::default())
        .await
    {
        Ok(_) => {}
        Err(RemoteError::AlreadyExists(_)) => {
            tracing::warn!(installation_id, %project, "installation already exists");
            return Ok(redirect(&st.site_url));
        }
        Err(e) => return Err(e.into()),
    }

    for repo in &repos {
        match register_repository(st.remote.as_ref(), &project, installation_id, repo, None).await {
            Ok(()) => tracing::info!(repo = %repo.name, "created repository"),
            Err(RemoteError::AlreadyExists(_)) => {
                tracing::info!(repo = %repo.name, "repository already registered");
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(installation_id, %project, repositories = repos.len(), "installation set up");
    Ok(redirect(&st.site_url))
}
