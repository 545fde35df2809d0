//! The chunked dispatch engine.
//!
//! Four operations over the store and collaborator ports:
//!
//! - `create_job`: validate, resolve the document set, persist Job + Items
//!   transactionally, run the first chunk inline (`initiator`)
//! - `process_chunk`: claim queued items, build and send emails, record
//!   outcomes per record (`processor`)
//! - finalization: compute the terminal status once nothing is queued
//!   (`finalizer`)
//! - `list_jobs` / `job_detail`: permission-scoped read side (`query`)
//!
//! Every call runs to completion within one invocation; repeated
//! `process_chunk` calls converge to a terminal job regardless of crashes
//! between calls, because only still-queued items are ever claimed and each
//! claimed item is terminally resolved before the call returns.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use mailroom_core::{DomainError, JobId};
use mailroom_dispatch::{AuditLog, DocumentStore, JobStatus, Mailer, SettingsProvider};

use crate::store::{DispatchStore, DispatchStoreError};

mod finalizer;
mod initiator;
mod processor;
mod query;

pub use initiator::{CreateJobRequest, CreateJobResult};
pub use processor::ChunkResult;
pub use query::{JobDetail, JobPage};

/// Items claimed per `process_chunk` invocation.
pub(crate) const CHUNK_SIZE: u32 = 10;

/// Window within which an idempotency key dedups job creation.
pub(crate) fn idempotency_window() -> Duration {
    Duration::minutes(10)
}

/// How long a claim lease holds before a crashed chunk's items become
/// claimable again.
pub(crate) fn claim_lease() -> Duration {
    Duration::minutes(5)
}

/// Engine operation error.
///
/// Only pre-work validation/configuration/permission failures and store
/// errors surface here; per-item and per-email failures are recorded as data
/// and reported through `errors[]` in the results.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] DispatchStoreError),
}

/// The dispatch engine with its injected collaborators.
///
/// Callable from an HTTP handler, a scheduled tick, or a worker loop — the
/// contract is independent of the calling context. Calls against different
/// jobs are fully independent; callers are expected to serialize calls per
/// job (the store's claim lease keeps concurrent calls from double-sending,
/// but the engine does not otherwise mutually exclude them).
#[derive(Clone)]
pub struct DispatchEngine {
    pub(crate) store: Arc<dyn DispatchStore>,
    pub(crate) documents: Arc<dyn DocumentStore>,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) audit: Arc<dyn AuditLog>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        documents: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
        audit: Arc<dyn AuditLog>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            store,
            documents,
            mailer,
            audit,
            settings,
        }
    }

    pub(crate) async fn require_job(
        &self,
        job_id: JobId,
    ) -> Result<mailroom_dispatch::Job, DispatchError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }
}

pub(crate) fn terminal_status_for(sent: u64, failed: u64, total: u64) -> JobStatus {
    if total == 0 || sent == 0 {
        JobStatus::Failed
    } else if failed == 0 {
        JobStatus::Sent
    } else {
        JobStatus::Partial
    }
}
