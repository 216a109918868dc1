//! Wire encoding of check records.
//!
//! Records travel as protobuf messages. Every field has a fixed tag so
//! producers and consumers can be upgraded independently; a kind this build
//! does not know decodes to [`CodecError::UnknownKind`] instead of a record.

use std::collections::BTreeMap;

use prost::Message;
use thiserror::Error;

use crate::check::{CheckKind, CheckRecord, RepoContext};

/// Option key carrying the build, test or environment name.
pub const NAME_OPTION: &str = "name";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
enum CheckKindProto {
    Unspecified = 0,
    Setup = 1,
    BuildImage = 2,
    RunTest = 3,
    ResourceValidation = 4,
}

#[derive(Clone, PartialEq, Message)]
struct CheckRecordProto {
    #[prost(enumeration = "CheckKindProto", tag = "1")]
    kind: i32,
    #[prost(string, tag = "2")]
    name: String,
    #[prost(string, tag = "3")]
    owner: String,
    #[prost(string, tag = "4")]
    repo: String,
    #[prost(string, tag = "5")]
    head_sha: String,
    #[prost(string, tag = "6")]
    branch: String,
    #[prost(string, tag = "7")]
    default_branch: String,
    #[prost(btree_map = "string, string", tag = "8")]
    options: BTreeMap<String, String>,
    #[prost(int64, optional, tag = "9")]
    check_run_id: Option<i64>,
    #[prost(int64, tag = "10")]
    installation_id: i64,
    #[prost(int64, tag = "11")]
    repo_id: i64,
}

/// Errors produced while decoding a queued record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bytes are not a valid record message.
    #[error("malformed check record: {0}")]
    Malformed(#[from] prost::DecodeError),
    /// Kind tag unknown to this build.
    #[error("unknown check kind {0}")]
    UnknownKind(i32),
    /// A kind that acts on a named entity arrived without its name.
    #[error("{kind} record is missing options[\"name\"]")]
    MissingName {
        /// Label of the decoded kind.
        kind: &'static str,
    },
}

/// Encodes a record for publication.
pub fn encode(record: &CheckRecord) -> Vec<u8> {
    let (kind, target) = match &record.kind {
        CheckKind::Setup => (CheckKindProto::Setup, None),
        CheckKind::BuildImage { build } => (CheckKindProto::BuildImage, Some(build)),
        CheckKind::RunTest { test } => (CheckKindProto::RunTest, Some(test)),
        CheckKind::ResourceValidation { environment } => {
            (CheckKindProto::ResourceValidation, Some(environment))
        }
    };

    let mut options = BTreeMap::new();
    if let Some(target) = target {
        options.insert(NAME_OPTION.to_string(), target.clone());
    }

    let ctx = &record.context;
    CheckRecordProto {
        kind: kind as i32,
        name: record.display_name(),
        owner: ctx.owner.clone(),
        repo: ctx.repo.clone(),
        head_sha: ctx.head_sha.clone(),
        branch: ctx.branch.clone(),
        default_branch: ctx.default_branch.clone(),
        options,
        check_run_id: record.check_run_id(),
        installation_id: ctx.installation_id,
        repo_id: ctx.repo_id,
    }
    .encode_to_vec()
}

/// Decodes a record received from the queue.
pub fn decode(bytes: &[u8]) -> Result<CheckRecord, CodecError> {
    let mut proto = CheckRecordProto::decode(bytes)?;

    let kind = match CheckKindProto::try_from(proto.kind) {
        Ok(CheckKindProto::Setup) => CheckKind::Setup,
        Ok(CheckKindProto::BuildImage) => CheckKind::BuildImage {
            build: take_name(&mut proto.options, crate::naming::BUILD_IMAGE)?,
        },
        Ok(CheckKindProto::RunTest) => CheckKind::RunTest {
            test: take_name(&mut proto.options, crate::naming::RUN_TEST)?,
        },
        Ok(CheckKindProto::ResourceValidation) => CheckKind::ResourceValidation {
            environment: take_name(&mut proto.options, crate::naming::RESOURCE_VALIDATION)?,
        },
        Ok(CheckKindProto::Unspecified) | Err(_) => return Err(CodecError::UnknownKind(proto.kind)),
    };

    let context = RepoContext {
        owner: proto.owner,
        repo: proto.repo,
        head_sha: proto.head_sha,
        branch: proto.branch,
        default_branch: proto.default_branch,
        installation_id: proto.installation_id,
        repo_id: proto.repo_id,
    };

    Ok(CheckRecord::new(kind, context).with_check_run_id(proto.check_run_id))
}

fn take_name(
    options: &mut BTreeMap<String, String>,
    kind: &'static str,
) -> Result<String, CodecError> {
    options
        .remove(NAME_OPTION)
        .filter(|name| !name.is_empty())
        .ok_or(CodecError::MissingName { kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RepoContext {
        RepoContext {
            owner: "acme".into(),
            repo: "shop".into(),
            head_sha: "0f3c".into(),
            branch: "feature/x".into(),
            default_branch: "main".into(),
            installation_id: 99,
            repo_id: 1234,
        }
    }

    #[test]
    fn carries_kind_target_and_handle() {
        let mut record = CheckRecord::new(
            CheckKind::ResourceValidation {
                environment: "prod".into(),
            },
            context(),
        );
        record.attach_status_check(77).unwrap();

        let decoded = decode(&encode(&record)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.check_run_id(), Some(77));
    }

    #[test]
    fn unspecified_and_future_kinds_are_reported() {
        let mut proto = CheckRecordProto {
            kind: 42,
            ..Default::default()
        };
        assert!(matches!(
            decode(&proto.encode_to_vec()),
            Err(CodecError::UnknownKind(42))
        ));

        proto.kind = CheckKindProto::Unspecified as i32;
        assert!(matches!(
            decode(&proto.encode_to_vec()),
            Err(CodecError::UnknownKind(0))
        ));
    }

    #[test]
    fn named_kinds_require_a_name() {
        let proto = CheckRecordProto {
            kind: CheckKindProto::RunTest as i32,
            ..Default::default()
        };
        let err = decode(&proto.encode_to_vec()).unwrap_err();
        assert!(matches!(err, CodecError::MissingName { kind: "Run Test" }));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
