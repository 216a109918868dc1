//! Routes a delivered check to its executor and republishes the follow-ups.

use std::sync::Arc;

use checkflow_core::CheckRecord;
use thiserror::Error;

use crate::{
    error::CheckError,
    executors::Executors,
    platform::{PlatformConnector, PlatformError},
    queue::Publisher,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no platform client for installation {installation_id}: {source}")]
    Connect {
        installation_id: i64,
        source: PlatformError,
    },
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error("{failed} of {total} follow-up checks could not be published")]
    FollowUpPublish { failed: usize, total: usize },
}

pub struct Dispatcher {
    connector: Arc<dyn PlatformConnector>,
    executors: Executors,
    publisher: Publisher,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        executors: Executors,
        publisher: Publisher,
    ) -> Self {
        Self {
            connector,
            executors,
            publisher,
        }
    }

    /// Runs the record's executor, then publishes each follow-up.
    ///
    /// Returns the number of follow-ups published. A failed publish does not
    /// stop the remaining ones and never undoes the executor's own work.
    pub async fn dispatch(&self, record: CheckRecord) -> Result<usize, DispatchError> {
        let installation_id = record.context.installation_id;
        let platform = self
            .connector
            .connect(installation_id)
            .await
            .map_err(|source| DispatchError::Connect {
                installation_id,
                source,
            })?;

        let name = record.display_name();
        tracing::info!(check = %name, repo = %record.context.repo, sha = %record.context.head_sha, "dispatching check");
        let follow_ups = self.executors.execute(platform.as_ref(), record).await?;

        let total = follow_ups.len();
        let mut failed = 0;
        for follow_up in &follow_ups {
            if let Err(e) = self.publisher.publish(follow_up).await {
                failed += 1;
                tracing::error!(
                    check = %name,
                    follow_up = %follow_up.display_name(),
                    error = %e,
                    "failed to publish follow-up check"
                );
            }
        }

        if failed > 0 {
            return Err(DispatchError::FollowUpPublish { failed, total });
        }
        Ok(total)
    }
}
