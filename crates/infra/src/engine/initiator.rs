//! Job creation: validation, idempotency, snapshotting, first chunk.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use mailroom_auth::PrincipalId;
use mailroom_core::{DomainError, JobId};
use mailroom_dispatch::{
    AuditEvent, DocumentMeta, Item, Job, JobMode, JobStatus, SourceSelector,
};

use super::{idempotency_window, DispatchEngine, DispatchError};

/// Input of `create_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub mode: JobMode,
    pub source: SourceSelector,
    pub idempotency_key: Option<String>,
}

/// Output of `create_job`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    /// True when an existing job was returned for the idempotency key.
    pub idempotent: bool,
    pub total: u32,
    pub processed: u32,
    pub remaining: u32,
    pub errors: Vec<String>,
}

impl DispatchEngine {
    /// Create a dispatch job and immediately run its first chunk, so small
    /// jobs finish in one round trip.
    ///
    /// Fails with a configuration error when dispatch is disabled or the
    /// account/recipient settings are missing, and with a validation error
    /// when the resolved document set is empty. Nothing is persisted in
    /// either case.
    pub async fn create_job(
        &self,
        requester: PrincipalId,
        request: CreateJobRequest,
    ) -> Result<CreateJobResult, DispatchError> {
        let snapshot = self.settings.current().freeze()?;

        let idempotency_key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        if let Some(key) = &idempotency_key {
            let window_start = Utc::now() - idempotency_window();
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(requester, key, window_start)
                .await?
            {
                info!(job_id = %existing.id, key, "idempotent replay, returning existing job");
                return Ok(CreateJobResult {
                    job_id: existing.id,
                    status: existing.status,
                    idempotent: true,
                    total: existing.total_items,
                    processed: existing.processed_items,
                    remaining: existing.remaining_items(),
                    errors: Vec::new(),
                });
            }
        }

        let resolved = self.resolve_source(&request.source).await?;
        if resolved.is_empty() {
            return Err(DomainError::validation("resolved document set is empty").into());
        }

        let job = Job::new(
            requester,
            request.mode,
            request.source,
            resolved.len() as u32,
            snapshot,
            idempotency_key,
        );
        let items: Vec<Item> = resolved
            .iter()
            .map(|(document_id, meta)| Item::new(job.id, *document_id, meta))
            .collect();

        // All-or-nothing: the job row and every item row, or none.
        self.store.create_job(&job, &items).await?;

        info!(
            job_id = %job.id,
            mode = job.mode.as_str(),
            total = job.total_items,
            "dispatch job created"
        );
        self.audit
            .record(AuditEvent::JobCreated {
                job_id: job.id,
                requester,
                mode: job.mode,
                total_items: job.total_items,
            })
            .await;

        let chunk = self.process_chunk(job.id).await?;

        Ok(CreateJobResult {
            job_id: job.id,
            status: chunk.status,
            idempotent: false,
            total: job.total_items,
            processed: chunk.processed_this_chunk,
            remaining: chunk.remaining,
            errors: chunk.errors,
        })
    }

    async fn resolve_source(
        &self,
        source: &SourceSelector,
    ) -> Result<Vec<(mailroom_core::DocumentId, DocumentMeta)>, DispatchError> {
        let resolved = match source {
            SourceSelector::Documents(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    // Unknown ids are skipped; an all-unknown set fails the
                    // emptiness check in create_job.
                    if let Some(meta) = self
                        .documents
                        .resolve(*id)
                        .await
                        .map_err(|e| DomainError::validation(e.to_string()))?
                    {
                        resolved.push((*id, meta));
                    }
                }
                resolved
            }
            SourceSelector::Collection(name) => self
                .documents
                .list_collection(name)
                .await
                .map_err(|e| DomainError::validation(e.to_string()))?,
        };
        Ok(resolved)
    }
}
