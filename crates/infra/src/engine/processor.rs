//! Chunk processing: claim, build, send, record.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use mailroom_core::{DocumentId, DomainError, JobId};
use mailroom_dispatch::{
    batching, template::TemplateVars, template, Attachment, AuditEvent, DocumentStoreError, Email,
    Item, JobMode, JobStatus,
};

use super::{claim_lease, DispatchEngine, DispatchError, CHUNK_SIZE};

/// Output of `process_chunk`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    pub status: JobStatus,
    pub processed_this_chunk: u32,
    pub remaining: u32,
    pub errors: Vec<String>,
}

/// An item with its loaded attachment content and send-time hash.
struct ResolvedItem {
    item: Item,
    content_hash: String,
}

impl DispatchEngine {
    /// Process the next chunk of a job's queued items.
    ///
    /// Claims up to [`CHUNK_SIZE`] queued items FIFO, terminally resolves
    /// each of them (sent or failed), advances the job counters additively,
    /// and finalizes the job once nothing remains queued. Each item/email
    /// outcome is committed as it completes: one failed email never rolls
    /// back others already sent in the same chunk, and a crash mid-chunk
    /// leaves the unprocessed rest queued for the next call.
    ///
    /// Calling this on an already-terminal job is a caller error.
    pub async fn process_chunk(&self, job_id: JobId) -> Result<ChunkResult, DispatchError> {
        let mut job = self.require_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "job {} is already {}",
                job.id,
                job.status.as_str()
            ))
            .into());
        }

        let now = Utc::now();
        let claimed = self
            .store
            .claim_queued_items(job.id, CHUNK_SIZE, now, now + claim_lease())
            .await?;

        if claimed.is_empty() {
            // Nothing claimable: either the job is done (finalize it) or a
            // concurrent call holds leases on the rest.
            self.finalize_if_done(&mut job).await?;
            let stats = self.store.item_stats(job.id).await?;
            return Ok(ChunkResult {
                status: job.status,
                processed_this_chunk: 0,
                remaining: stats.queued as u32,
                errors: Vec::new(),
            });
        }

        job.mark_processing(now)?;
        self.store.update_job(&job).await?;

        let groups: Vec<Vec<Item>> = match job.mode {
            JobMode::Single => claimed.into_iter().map(|item| vec![item]).collect(),
            JobMode::Batch => batching::pack(
                claimed,
                job.settings.max_attachments,
                job.settings.max_total_bytes,
            ),
        };

        let mut errors: Vec<String> = Vec::new();
        let mut sent_count: u32 = 0;
        let mut failed_count: u32 = 0;

        for group in groups {
            let (sent, failed) = self.send_group(&job, group, &mut errors).await?;
            sent_count += sent;
            failed_count += failed;
        }

        job.apply_chunk(sent_count, failed_count, Utc::now())?;
        self.store.update_job(&job).await?;

        let stats = self.store.item_stats(job.id).await?;
        if stats.queued == 0 {
            self.finalize_if_done(&mut job).await?;
        }

        info!(
            job_id = %job.id,
            processed = sent_count + failed_count,
            sent = sent_count,
            failed = failed_count,
            remaining = stats.queued,
            "chunk processed"
        );

        Ok(ChunkResult {
            status: job.status,
            processed_this_chunk: sent_count + failed_count,
            remaining: stats.queued as u32,
            errors,
        })
    }

    /// Build and send one email for a claimed group. Returns (sent, failed)
    /// item counts; transport failures are recorded, never propagated.
    async fn send_group(
        &self,
        job: &mailroom_dispatch::Job,
        group: Vec<Item>,
        errors: &mut Vec<String>,
    ) -> Result<(u32, u32), DispatchError> {
        let now = Utc::now();
        let mut resolved: Vec<ResolvedItem> = Vec::with_capacity(group.len());
        let mut attachments: Vec<Attachment> = Vec::with_capacity(group.len());
        let mut failed_count: u32 = 0;

        for mut item in group {
            match self.documents.load(&item.locator).await {
                Ok(content) => {
                    let content_hash = hex::encode(Sha256::digest(&content));
                    attachments.push(Attachment {
                        filename: item.filename.clone(),
                        content,
                    });
                    resolved.push(ResolvedItem { item, content_hash });
                }
                Err(err) => {
                    let message = match &err {
                        DocumentStoreError::NotFound(_) => {
                            format!("file not found: {}", item.locator)
                        }
                        DocumentStoreError::Backend(m) => m.clone(),
                    };
                    item.mark_failed(&message, now)?;
                    self.store.update_item(&item).await?;
                    errors.push(format!("item {} ({}): {message}", item.id, item.filename));
                    failed_count += 1;
                }
            }
        }

        // A group left with zero resolved attachments is skipped entirely:
        // its items are already failed, no email is sent.
        if resolved.is_empty() {
            return Ok((0, failed_count));
        }

        let count = resolved.len() as u32;
        let total_size: u64 = attachments.iter().map(|a| a.content.len() as u64).sum();
        let vars = TemplateVars {
            mailbox: job.target_address.clone(),
            date: now,
            count,
            user: job.requester.to_string(),
        };
        let subject = template::render(&job.settings.subject_template, &vars);
        let body = template::render(&job.settings.body_template, &vars);

        let mut email = Email::new(
            job.id,
            job.target_address.clone(),
            subject,
            body,
            count,
            total_size,
        );
        self.store.insert_email(&email).await?;

        match self
            .mailer
            .send(
                &job.settings.account,
                &email.recipient,
                &email.subject,
                &email.body,
                &attachments,
            )
            .await
        {
            Ok(receipt) => {
                let now = Utc::now();
                email.mark_sent(receipt.message_id, now)?;
                self.store.update_email(&email).await?;

                let document_ids: Vec<DocumentId> =
                    resolved.iter().map(|r| r.item.document_id).collect();
                let (archived, recolored) = self.apply_side_effects(job, &document_ids).await;

                for ResolvedItem { mut item, content_hash } in resolved {
                    item.archived = archived;
                    item.recolored = recolored;
                    item.mark_sent(email.id, content_hash, now)?;
                    self.store.update_item(&item).await?;
                }

                self.audit
                    .record(AuditEvent::EmailSent {
                        job_id: job.id,
                        email_id: email.id,
                        attachment_count: count,
                    })
                    .await;

                Ok((count, failed_count))
            }
            Err(err) => {
                let now = Utc::now();
                let message = err.to_string();
                email.mark_failed(&message, now)?;
                self.store.update_email(&email).await?;

                for ResolvedItem { mut item, .. } in resolved {
                    item.mark_failed(&message, now)?;
                    self.store.update_item(&item).await?;
                }

                warn!(job_id = %job.id, email_id = %email.id, error = %message, "email send failed");
                errors.push(format!("email {}: {message}", email.id));
                self.audit
                    .record(AuditEvent::EmailFailed {
                        job_id: job.id,
                        email_id: email.id,
                        error: message,
                    })
                    .await;

                Ok((0, failed_count + count))
            }
        }
    }

    /// Best-effort post-send side effects. Their failure is logged and
    /// reflected in the item flags, but never reverts a sent outcome.
    async fn apply_side_effects(
        &self,
        job: &mailroom_dispatch::Job,
        document_ids: &[DocumentId],
    ) -> (bool, bool) {
        let mut archived = false;
        let mut recolored = false;

        if job.settings.archive_after_send {
            match self.documents.set_archived(document_ids).await {
                Ok(()) => archived = true,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "archive side effect failed");
                }
            }
        }

        if job.settings.recolor_after_send {
            match self
                .documents
                .set_color(document_ids, &job.settings.recolor_color)
                .await
            {
                Ok(()) => recolored = true,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "recolor side effect failed");
                }
            }
        }

        (archived, recolored)
    }
}
