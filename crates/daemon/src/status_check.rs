//! Check-run lifecycle shared by every executor: create, mark in progress, conclude.

use checkflow_core::{CheckRecord, Conclusion};

use crate::{
    error::{CheckError, StageFailure},
    platform::{Annotation, CheckRunUpdate, Platform},
};

/// What a stage produced when it ran to a conclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub conclusion: Conclusion,
    pub summary: String,
    pub text: Option<String>,
    pub annotations: Vec<Annotation>,
    pub follow_ups: Vec<CheckRecord>,
}

impl StageOutcome {
    pub fn new(conclusion: Conclusion, summary: impl Into<String>) -> Self {
        Self {
            conclusion,
            summary: summary.into(),
            text: None,
            annotations: Vec::new(),
            follow_ups: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: String) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_follow_ups(mut self, follow_ups: Vec<CheckRecord>) -> Self {
        self.follow_ups = follow_ups;
        self
    }
}

/// An open check run bound to a record.
pub struct StatusCheck<'a> {
    platform: &'a dyn Platform,
    record: &'a CheckRecord,
    name: String,
    id: i64,
}

impl<'a> StatusCheck<'a> {
    /// Creates the check run, attaches its handle to `record` and marks it in progress.
    ///
    /// A failed in-progress update is logged only; the check still concludes later.
    pub async fn open(
        platform: &'a dyn Platform,
        record: &'a mut CheckRecord,
        summary: &str,
    ) -> Result<StatusCheck<'a>, CheckError> {
        let name = record.display_name();
        let id = platform.create_check_run(&record.context, &name).await?;
        record.attach_status_check(id)?;
        let record: &'a CheckRecord = record;

        let update = CheckRunUpdate::in_progress(&name, summary);
        if let Err(e) = platform.update_check_run(&record.context, id, &update).await {
            tracing::warn!(check = %name, check_run_id = id, error = %e, "failed to mark check in progress");
        }

        Ok(Self {
            platform,
            record,
            name,
            id,
        })
    }

    pub fn record(&self) -> &CheckRecord {
        self.record
    }

    /// Concludes the check run and hands back the stage's follow-ups.
    ///
    /// A failed stage is written as a failure with its summary before the error
    /// is returned.
    pub async fn finish(
        self,
        result: Result<StageOutcome, StageFailure>,
    ) -> Result<Vec<CheckRecord>, CheckError> {
        match result {
            Ok(outcome) => {
                let update = CheckRunUpdate::completed(
                    &self.name,
                    outcome.conclusion,
                    outcome.summary,
                    outcome.text,
                )
                .with_annotations(outcome.annotations);
                self.conclude(&update).await?;
                tracing::info!(check = %self.name, conclusion = %outcome.conclusion, follow_ups = outcome.follow_ups.len(), "check concluded");
                Ok(outcome.follow_ups)
            }
            Err(failure) => {
                let update =
                    CheckRunUpdate::completed(&self.name, Conclusion::Failure, failure.summary, None);
                if let Err(e) = self.conclude(&update).await {
                    tracing::error!(check = %self.name, error = %e, "failed to record check failure");
                }
                tracing::warn!(check = %self.name, error = %failure.error, "check failed");
                Err(failure.error)
            }
        }
    }

    async fn conclude(&self, update: &CheckRunUpdate) -> Result<(), CheckError> {
        self.platform
            .update_check_run(&self.record.context, self.id, update)
            .await?;
        Ok(())
    }
}
