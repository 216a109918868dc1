#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and logic for the check orchestration pipeline.

pub mod check;
pub mod codec;
pub mod events;
pub mod manifest;
pub mod naming;
pub mod status;

mod util;

pub use check::{CheckKind, CheckRecord, RepoContext};
pub use status::{Conclusion, ExecutionState};
pub use util::{new_ulid, now_ms};
