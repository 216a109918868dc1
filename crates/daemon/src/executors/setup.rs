use checkflow_core::{manifest::Manifest, CheckKind, CheckRecord, Conclusion};

use crate::{
    error::{CheckError, OrFail, StageFailure},
    platform::Platform,
    status_check::{StageOutcome, StatusCheck},
};

const NO_MANIFEST: &str = "No 'phantom.yaml' file detected.";

pub(super) async fn run(
    platform: &dyn Platform,
    mut record: CheckRecord,
) -> Result<Vec<CheckRecord>, CheckError> {
    let check = StatusCheck::open(platform, &mut record, "Running setup check.").await?;
    let result = stage(platform, check.record()).await;
    check.finish(result).await
}

async fn stage(platform: &dyn Platform, record: &CheckRecord) -> Result<StageOutcome, StageFailure> {
    let snapshot = platform
        .download_snapshot(&record.context)
        .await
        .or_fail("Failed to download files from your repository.")?;

    let Some(manifest) =
        Manifest::load(snapshot.root()).or_fail("Unable to load your 'phantom.yaml' file.")?
    else {
        tracing::info!(repo = %record.context.repo, sha = %record.context.head_sha, "no manifest in commit");
        return Ok(StageOutcome::new(Conclusion::Success, NO_MANIFEST));
    };
    drop(snapshot);

    let builds = manifest.builds.iter().map(|b| CheckKind::BuildImage {
        build: b.name.clone(),
    });
    let validations = manifest
        .environments
        .iter()
        .map(|e| CheckKind::ResourceValidation {
            environment: e.environment.clone(),
        });
    let follow_ups = builds
        .chain(validations)
        .map(|kind| record.follow_up(kind))
        .collect();

    Ok(StageOutcome::new(Conclusion::Success, "Setup complete.").with_follow_ups(follow_ups))
}
