//! Best-effort persistence tracked per run.

use tokio::task::JoinSet;

use super::TRACING_TARGET;
use crate::store::{NodeLog, SharedStore};

/// Node log writes spawned during a run.
///
/// Writes run in the background and never fail the run. [`flush`] awaits
/// every outstanding write so a terminal run has durable logs.
///
/// [`flush`]: PendingWrites::flush
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    tasks: JoinSet<()>,
}

impl PendingWrites {
    /// Spawns the write of a node log.
    pub fn spawn_node_log(&mut self, store: SharedStore, log: NodeLog) {
        self.tasks.spawn(async move {
            if let Err(error) = store.create_node_log(&log).await {
                tracing::warn!(
                    target: TRACING_TARGET,
                    execution_id = %log.execution_id,
                    node_id = %log.node_id,
                    error = %error,
                    "Failed to persist node log"
                );
            }
        });
    }

    /// Returns the number of writes not yet awaited.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Awaits every outstanding write.
    pub async fn flush(&mut self) {
        let pending = self.tasks.len();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(error) = joined {
                tracing::warn!(target: TRACING_TARGET, error = %error, "Persistence task panicked");
            }
        }
        if pending > 0 {
            tracing::trace!(target: TRACING_TARGET, pending, "Flushed pending writes");
        }
    }
}
