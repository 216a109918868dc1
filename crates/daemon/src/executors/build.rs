use checkflow_core::{CheckKind, CheckRecord, Conclusion};

use super::{fetch_manifest, Executors, TestFanOut};
use crate::{
    error::{CheckError, OrFail, StageFailure},
    platform::Platform,
    remote::ExecutionRequest,
    status_check::{StageOutcome, StatusCheck},
};

pub(super) async fn run(
    executors: &Executors,
    platform: &dyn Platform,
    mut record: CheckRecord,
    build: &str,
) -> Result<Vec<CheckRecord>, CheckError> {
    let check = StatusCheck::open(platform, &mut record, "Running Docker build for image.").await?;
    let result = stage(executors, platform, check.record(), build).await;
    check.finish(result).await
}

async fn stage(
    executors: &Executors,
    platform: &dyn Platform,
    record: &CheckRecord,
    build_name: &str,
) -> Result<StageOutcome, StageFailure> {
    let manifest = fetch_manifest(platform, record).await.map_err(|e| {
        e.summarize(
            "Unable to download the contents of the commit to run the build.",
            "Unable to get 'phantom.yaml' file for building image.",
        )
    })?;

    let build = manifest
        .build(build_name)
        .ok_or_else(|| CheckError::Undeclared {
            entity: "build",
            name: build_name.to_string(),
        })
        .or_fail("Unable to get the build from the config file.")?;

    tracing::info!(build = %build.name, sha = %record.context.head_sha, "running build");
    let conclusion = executors
        .runner
        .run(platform, record, ExecutionRequest::Build(build))
        .await
        .or_fail("Unable to complete build execution.")?;

    let tests: Vec<_> = match executors.fan_out {
        TestFanOut::BuildScoped if conclusion == Conclusion::Success => {
            manifest.tests_for_build(&build.name).collect()
        }
        TestFanOut::BuildScoped => Vec::new(),
        TestFanOut::All => manifest.tests.iter().collect(),
    };
    let follow_ups = tests
        .into_iter()
        .map(|t| {
            record.follow_up(CheckKind::RunTest {
                test: t.name.clone(),
            })
        })
        .collect();

    Ok(StageOutcome::new(
        conclusion,
        format!("Docker build completed with status '{conclusion}'."),
    )
    .with_follow_ups(follow_ups))
}
