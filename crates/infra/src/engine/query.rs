//! Read-only job listing and detail, permission-scoped.

use serde::Serialize;

use mailroom_auth::Principal;
use mailroom_core::{DomainError, JobId};
use mailroom_dispatch::{Email, Item, Job};

use super::{DispatchEngine, DispatchError};

/// One page of jobs.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
}

/// Full view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub job: Job,
    pub items: Vec<Item>,
    pub emails: Vec<Email>,
    /// True when the settings snapshot must not be shown to the caller
    /// (it references the sending account).
    pub settings_redacted: bool,
}

impl DispatchEngine {
    /// List jobs, newest first: own jobs for ordinary callers, all jobs for
    /// elevated callers. No mutation, no side effects.
    pub async fn list_jobs(
        &self,
        principal: &Principal,
        limit: u32,
        offset: u32,
    ) -> Result<JobPage, DispatchError> {
        let scope = if principal.is_elevated() {
            None
        } else {
            Some(principal.principal_id)
        };
        let listing = self.store.list_jobs(scope, limit, offset).await?;
        Ok(JobPage {
            jobs: listing.jobs,
            total: listing.total,
        })
    }

    /// Fetch one job with its items and emails.
    ///
    /// Non-elevated callers only see their own jobs; for them the settings
    /// snapshot is flagged for redaction.
    pub async fn job_detail(
        &self,
        principal: &Principal,
        job_id: JobId,
    ) -> Result<JobDetail, DispatchError> {
        let job = self.require_job(job_id).await?;
        let elevated = principal.is_elevated();
        if !elevated && job.requester != principal.principal_id {
            // Indistinguishable from a missing job on purpose.
            return Err(DomainError::NotFound.into());
        }

        let items = self.store.list_items(job_id).await?;
        let emails = self.store.list_emails(job_id).await?;
        Ok(JobDetail {
            job,
            items,
            emails,
            settings_redacted: !elevated,
        })
    }
}
