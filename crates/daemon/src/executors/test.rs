use checkflow_core::CheckRecord;

use super::{fetch_manifest, Executors};
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
    test: &str,
) -> Result<Vec<CheckRecord>, CheckError> {
    let check = StatusCheck::open(platform, &mut record, "Running Docker tests for images.").await?;
    let result = stage(executors, platform, check.record(), test).await;
    check.finish(result).await
}

async fn stage(
    executors: &Executors,
    platform: &dyn Platform,
    record: &CheckRecord,
    test_name: &str,
) -> Result<StageOutcome, StageFailure> {
    let manifest = fetch_manifest(platform, record).await.map_err(|e| {
        e.summarize(
            "Unable to download the contents of the commit to run tests.",
            "Unable to get 'phantom.yaml' file for testing image.",
        )
    })?;

    let test = manifest.test(test_name).ok_or_else(|| {
        let error = CheckError::Undeclared {
            entity: "test",
            name: test_name.to_string(),
        };
        StageFailure {
            summary: error.to_string(),
            error,
        }
    })?;
    if manifest.build(&test.build).is_none() {
        let summary = format!(
            "Unable to get build '{}' used by test '{}'.",
            test.build, test.name
        );
        return Err(StageFailure {
            summary,
            error: CheckError::Undeclared {
                entity: "build",
                name: test.build.clone(),
            },
        });
    }

    tracing::info!(test = %test.name, build = %test.build, "running test");
    let conclusion = executors
        .runner
        .run(platform, record, ExecutionRequest::Test(test))
        .await
        .or_fail("Unable to complete test execution.")?;

    Ok(StageOutcome::new(
        conclusion,
        format!("Test execution completed with status '{conclusion}'."),
    ))
}
