//! Terminal status computation.

use chrono::Utc;
use tracing::info;

use mailroom_dispatch::{AuditEvent, Job};

use super::{terminal_status_for, DispatchEngine, DispatchError};

impl DispatchEngine {
    /// Finalize the job if no items remain queued.
    ///
    /// All items sent → `sent`; all failed → `failed`; mixed → `partial`;
    /// a job that never had items to process → `failed` (degenerate).
    /// Idempotent: item statuses never change once set, so recomputing on an
    /// already-terminal job yields the same status.
    pub(crate) async fn finalize_if_done(&self, job: &mut Job) -> Result<(), DispatchError> {
        let stats = self.store.item_stats(job.id).await?;
        if stats.queued > 0 {
            return Ok(());
        }

        let status = terminal_status_for(stats.sent, stats.failed, stats.total);
        if job.status == status {
            return Ok(());
        }

        job.mark_terminal(status, Utc::now())?;
        self.store.update_job(job).await?;

        info!(job_id = %job.id, status = status.as_str(), "dispatch job finalized");
        self.audit
            .record(AuditEvent::JobFinalized {
                job_id: job.id,
                status,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mailroom_dispatch::JobStatus;

    use super::*;

    #[test]
    fn terminal_status_matrix() {
        // all sent
        assert_eq!(terminal_status_for(3, 0, 3), JobStatus::Sent);
        // all failed
        assert_eq!(terminal_status_for(0, 3, 3), JobStatus::Failed);
        // mixed
        assert_eq!(terminal_status_for(2, 1, 3), JobStatus::Partial);
        // degenerate: nothing ever processed
        assert_eq!(terminal_status_for(0, 0, 0), JobStatus::Failed);
    }
}
