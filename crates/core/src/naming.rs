//! Check-run display names.
//!
//! A check's display name is the only thing the platform hands back when a
//! user asks for a re-run, so every kind has a fixed name pattern that can be
//! parsed back into the kind and its target.

use thiserror::Error;

use crate::check::CheckKind;

/// Name of the initial check created for every pushed commit.
pub const SETUP: &str = "Setup";
/// Label of image build checks.
pub const BUILD_IMAGE: &str = "Build Image";
/// Label of test checks.
pub const RUN_TEST: &str = "Run Test";
/// Label of resource validation checks.
pub const RESOURCE_VALIDATION: &str = "Resource Validation";

const SEPARATOR: &str = " - ";

/// Returned when a check-run name matches no known pattern.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("check run name '{0}' does not match any known check pattern")]
pub struct NameError(pub String);

/// Formats the display name for a check kind.
pub fn format_check_name(kind: &CheckKind) -> String {
    match kind.target() {
        Some(target) => format!("{}{SEPARATOR}{target}", kind.label()),
        None => kind.label().to_string(),
    }
}

/// Recovers the check kind (and its target) from a display name.
pub fn parse_check_name(name: &str) -> Result<CheckKind, NameError> {
    if name == SETUP {
        return Ok(CheckKind::Setup);
    }

    let target = |label: &str| {
        name.strip_prefix(label)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
    };

    if let Some(build) = target(BUILD_IMAGE) {
        return Ok(CheckKind::BuildImage { build });
    }
    if let Some(test) = target(RUN_TEST) {
        return Ok(CheckKind::RunTest { test });
    }
    if let Some(environment) = target(RESOURCE_VALIDATION) {
        return Ok(CheckKind::ResourceValidation { environment });
    }

    Err(NameError(name.to_string()))
}
