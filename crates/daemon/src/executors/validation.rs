use checkflow_core::{CheckRecord, Conclusion};

use super::{fetch_manifest, Executors};
use crate::{
    cloud::{drift_annotations, render_status_table},
    error::{CheckError, OrFail, StageFailure},
    platform::Platform,
    status_check::{StageOutcome, StatusCheck},
};

pub(super) async fn run(
    executors: &Executors,
    platform: &dyn Platform,
    mut record: CheckRecord,
    environment: &str,
) -> Result<Vec<CheckRecord>, CheckError> {
    let check = StatusCheck::open(
        platform,
        &mut record,
        "Validating resources for selected environment.",
    )
    .await?;
    let result = stage(executors, platform, check.record(), environment).await;
    check.finish(result).await
}

async fn stage(
    executors: &Executors,
    platform: &dyn Platform,
    record: &CheckRecord,
    env_name: &str,
) -> Result<StageOutcome, StageFailure> {
    let manifest = fetch_manifest(platform, record).await.map_err(|e| {
        e.summarize(
            "Unable to download the contents of the commit to check resources.",
            "Unable to get 'phantom.yaml' file for resource validation.",
        )
    })?;

    let Some(environment) = manifest.environment(env_name) else {
        let error = CheckError::Undeclared {
            entity: "environment",
            name: env_name.to_string(),
        };
        return Err(StageFailure {
            summary: error.to_string(),
            error,
        });
    };

    let token = executors
        .credentials
        .access_token()
        .await
        .or_fail("Failed to get access token to connect with your cloud.")?;

    let project = match &executors.cloud_project {
        Some(project) => project.clone(),
        None => executors
            .runner
            .resolve_project(record.context.installation_id)
            .await
            .or_fail("Unable to resolve the project for this installation.")?,
    };

    tracing::info!(environment = env_name, %project, "validating resources");
    let statuses = executors
        .inspector
        .inspect(&project, environment, &token)
        .await
        .or_fail("Failed to get status of cloud resources.")?;

    Ok(StageOutcome::new(
        Conclusion::Success,
        format!("Resource validation completed for environment '{env_name}'."),
    )
    .with_text(render_status_table(&statuses))
    .with_annotations(drift_annotations(&statuses)))
}
