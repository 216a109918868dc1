//! Check records: what a unit of pipeline work is and where it runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming;

/// Kind of check to execute, with the target each kind acts on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Inspects the commit's manifest and fans out builds and validations.
    Setup,
    /// Builds the named image on the remote execution service.
    BuildImage {
        /// Build name as declared in the manifest.
        build: String,
    },
    /// Runs the named test on the remote execution service.
    RunTest {
        /// Test name as declared in the manifest.
        test: String,
    },
    /// Compares the named environment's declared resources with the cloud.
    ResourceValidation {
        /// Environment name as declared in the manifest.
        environment: String,
    },
}

impl CheckKind {
    /// Stable label used in logs and on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Setup => naming::SETUP,
            Self::BuildImage { .. } => naming::BUILD_IMAGE,
            Self::RunTest { .. } => naming::RUN_TEST,
            Self::ResourceValidation { .. } => naming::RESOURCE_VALIDATION,
        }
    }

    /// Name of the manifest entity this check acts on, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Setup => None,
            Self::BuildImage { build } => Some(build),
            Self::RunTest { test } => Some(test),
            Self::ResourceValidation { environment } => Some(environment),
        }
    }
}

/// Repository and commit a check runs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RepoContext {
    /// Account that owns the repository.
    pub owner: String,
    /// Repository name (without owner).
    pub repo: String,
    /// Commit the check reports on.
    pub head_sha: String,
    /// Branch the commit was pushed to.
    pub branch: String,
    /// Repository default branch.
    pub default_branch: String,
    /// Platform app installation that grants access to the repository.
    pub installation_id: i64,
    /// Platform repository id.
    pub repo_id: i64,
}

/// Returned when a status-check handle is attached twice.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("check '{name}' already has status check {existing}")]
pub struct AlreadyAttached {
    /// Display name of the check.
    pub name: String,
    /// Handle that was already attached.
    pub existing: i64,
}

/// Unit of orchestrated work passed between every pipeline stage.
///
/// Records are moved across the queue by value. An executor that wants
/// further work done builds new records with [`CheckRecord::follow_up`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRecord {
    /// What to run.
    pub kind: CheckKind,
    /// Where to run it.
    pub context: RepoContext,
    check_run_id: Option<i64>,
}

impl CheckRecord {
    /// Creates a record without a status-check handle.
    pub fn new(kind: CheckKind, context: RepoContext) -> Self {
        Self {
            kind,
            context,
            check_run_id: None,
        }
    }

    /// Initial record for a freshly pushed commit.
    pub fn setup(context: RepoContext) -> Self {
        Self::new(CheckKind::Setup, context)
    }

    /// Builds a follow-up record for the same commit. The status handle is never carried over.
    pub fn follow_up(&self, kind: CheckKind) -> Self {
        Self::new(kind, self.context.clone())
    }

    /// Check-run display name, e.g. `Build Image - api`.
    pub fn display_name(&self) -> String {
        naming::format_check_name(&self.kind)
    }

    /// Platform status-check handle, once created.
    pub fn check_run_id(&self) -> Option<i64> {
        self.check_run_id
    }

    /// Records the status-check handle. Fails if one is already set.
    pub fn attach_status_check(&mut self, id: i64) -> Result<(), AlreadyAttached> {
        if let Some(existing) = self.check_run_id {
            return Err(AlreadyAttached {
                name: self.display_name(),
                existing,
            });
        }
        self.check_run_id = Some(id);
        Ok(())
    }

    pub(crate) fn with_check_run_id(mut self, id: Option<i64>) -> Self {
        self.check_run_id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RepoContext {
        RepoContext {
            owner: "acme".into(),
            repo: "shop".into(),
            head_sha: "abc123".into(),
            branch: "main".into(),
            default_branch: "main".into(),
            installation_id: 7,
            repo_id: 42,
        }
    }

    #[test]
    fn handle_is_attached_once() {
        let mut record = CheckRecord::setup(context());
        assert_eq!(record.check_run_id(), None);
        record.attach_status_check(11).unwrap();
        let err = record.attach_status_check(12).unwrap_err();
        assert_eq!(err.existing, 11);
        assert_eq!(record.check_run_id(), Some(11));
    }

    #[test]
    fn follow_up_copies_context_but_not_handle() {
        let mut record = CheckRecord::setup(context());
        record.attach_status_check(5).unwrap();

        let next = record.follow_up(CheckKind::BuildImage {
            build: "api".into(),
        });
        assert_eq!(next.context, record.context);
        assert_eq!(next.check_run_id(), None);
        assert_eq!(next.display_name(), "Build Image - api");
    }
}
