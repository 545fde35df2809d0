//! Persistence for jobs, items and emails.
//!
//! The "queue" is a relational table polled per invocation, not a broker:
//! the engine claims still-queued items through the store and commits each
//! record's outcome as it completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailroom_auth::PrincipalId;
use mailroom_core::JobId;
use mailroom_dispatch::{Email, Item, Job};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryDispatchStore;
pub use postgres::PostgresDispatchStore;

/// Store operation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchStoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Item counts per status for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ItemStats {
    pub total: u64,
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
}

/// One page of a job listing.
#[derive(Debug, Clone)]
pub struct JobListing {
    pub jobs: Vec<Job>,
    pub total: u64,
}

/// Persistence abstraction for the dispatch engine.
///
/// `claim_queued_items` is the concurrency-sensitive operation: it must
/// atomically select-and-lease currently-queued rows so two overlapping
/// callers never receive the same item. Leases expire (crash recovery);
/// everything else is plain row CRUD.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Persist a job and all of its items in one transaction (all-or-nothing).
    async fn create_job(&self, job: &Job, items: &[Item]) -> Result<(), DispatchStoreError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, DispatchStoreError>;

    async fn update_job(&self, job: &Job) -> Result<(), DispatchStoreError>;

    /// Find a job created by `requester` with this idempotency key at or
    /// after `created_after`. Newest match wins.
    async fn find_by_idempotency_key(
        &self,
        requester: PrincipalId,
        key: &str,
        created_after: DateTime<Utc>,
    ) -> Result<Option<Job>, DispatchStoreError>;

    /// Atomically claim up to `limit` queued items of the job, FIFO by
    /// creation order, leasing them until `lease_until`. Items already under
    /// an unexpired lease are skipped.
    async fn claim_queued_items(
        &self,
        job_id: JobId,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Item>, DispatchStoreError>;

    /// Persist an item's outcome and release its lease.
    async fn update_item(&self, item: &Item) -> Result<(), DispatchStoreError>;

    async fn insert_email(&self, email: &Email) -> Result<(), DispatchStoreError>;

    async fn update_email(&self, email: &Email) -> Result<(), DispatchStoreError>;

    async fn item_stats(&self, job_id: JobId) -> Result<ItemStats, DispatchStoreError>;

    /// List jobs, newest first. `requester = None` lists every job
    /// (elevated callers); otherwise only the requester's own.
    async fn list_jobs(
        &self,
        requester: Option<PrincipalId>,
        limit: u32,
        offset: u32,
    ) -> Result<JobListing, DispatchStoreError>;

    async fn list_items(&self, job_id: JobId) -> Result<Vec<Item>, DispatchStoreError>;

    async fn list_emails(&self, job_id: JobId) -> Result<Vec<Email>, DispatchStoreError>;
}
