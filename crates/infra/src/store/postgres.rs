//! Postgres-backed dispatch store.
//!
//! Jobs, items and emails are plain relational rows; the item table doubles
//! as the work queue. The claim step is a single conditional UPDATE limited
//! to currently-queued rows (`FOR UPDATE SKIP LOCKED` inside the subquery),
//! so two overlapping chunk calls can never claim the same item. Leases
//! (`locked_until`) expire, which is what makes crashed chunks resumable.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;

use async_trait::async_trait;

use mailroom_auth::PrincipalId;
use mailroom_core::{DocumentId, EmailId, ItemId, JobId};
use mailroom_dispatch::{Email, EmailStatus, Item, ItemStatus, Job, JobMode, JobStatus};

use super::{DispatchStore, DispatchStoreError, ItemStats, JobListing};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dispatch_jobs (
    id              UUID PRIMARY KEY,
    requester       UUID NOT NULL,
    status          TEXT NOT NULL,
    mode            TEXT NOT NULL,
    source          JSONB NOT NULL,
    total_items     INTEGER NOT NULL,
    processed_items INTEGER NOT NULL,
    sent_items      INTEGER NOT NULL,
    failed_items    INTEGER NOT NULL,
    settings        JSONB NOT NULL,
    idempotency_key TEXT,
    target_address  TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    completed_at    TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS dispatch_items (
    id            UUID PRIMARY KEY,
    job_id        UUID NOT NULL REFERENCES dispatch_jobs (id),
    document_id   UUID NOT NULL,
    filename      TEXT NOT NULL,
    locator       TEXT NOT NULL,
    size_bytes    BIGINT NOT NULL,
    status        TEXT NOT NULL,
    email_id      UUID,
    content_hash  TEXT,
    archived      BOOLEAN NOT NULL,
    recolored     BOOLEAN NOT NULL,
    error         TEXT,
    locked_until  TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS dispatch_emails (
    id                  UUID PRIMARY KEY,
    job_id              UUID NOT NULL REFERENCES dispatch_jobs (id),
    recipient           TEXT NOT NULL,
    subject             TEXT NOT NULL,
    body                TEXT NOT NULL,
    attachment_count    INTEGER NOT NULL,
    total_size          BIGINT NOT NULL,
    status              TEXT NOT NULL,
    provider_message_id TEXT,
    error               TEXT,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dispatch_items_claim
    ON dispatch_items (job_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_dispatch_jobs_idempotency
    ON dispatch_jobs (requester, idempotency_key, created_at);
"#;

/// Postgres dispatch store.
///
/// Uses the SQLx connection pool (thread-safe, `Send + Sync`). Job creation
/// is the only multi-row transaction; every other write commits one record,
/// which is what the engine's per-item commit granularity relies on.
#[derive(Debug, Clone)]
pub struct PostgresDispatchStore {
    pool: Arc<PgPool>,
}

impl PostgresDispatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), DispatchStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl DispatchStore for PostgresDispatchStore {
    async fn create_job(&self, job: &Job, items: &[Item]) -> Result<(), DispatchStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("create_job", e))?;

        let source = serde_json::to_value(&job.source)
            .map_err(|e| DispatchStoreError::Storage(format!("serialize source: {e}")))?;
        let settings = serde_json::to_value(&job.settings)
            .map_err(|e| DispatchStoreError::Storage(format!("serialize settings: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_jobs (
                id, requester, status, mode, source,
                total_items, processed_items, sent_items, failed_items,
                settings, idempotency_key, target_address,
                created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.requester.as_uuid())
        .bind(job.status.as_str())
        .bind(job.mode.as_str())
        .bind(&source)
        .bind(job.total_items as i32)
        .bind(job.processed_items as i32)
        .bind(job.sent_items as i32)
        .bind(job.failed_items as i32)
        .bind(&settings)
        .bind(job.idempotency_key.as_deref())
        .bind(&job.target_address)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_job", e))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO dispatch_items (
                    id, job_id, document_id, filename, locator, size_bytes,
                    status, email_id, content_hash, archived, recolored, error,
                    locked_until, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL, $13, $14)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.job_id.as_uuid())
            .bind(item.document_id.as_uuid())
            .bind(&item.filename)
            .bind(&item.locator)
            .bind(item.size_bytes as i64)
            .bind(item.status.as_str())
            .bind(item.email_id.map(|id| *id.as_uuid()))
            .bind(item.content_hash.as_deref())
            .bind(item.archived)
            .bind(item.recolored)
            .bind(item.error.as_deref())
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_job", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("create_job", e))?;
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, DispatchStoreError> {
        let row = sqlx::query("SELECT * FROM dispatch_jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<(), DispatchStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_jobs
            SET status = $2, processed_items = $3, sent_items = $4,
                failed_items = $5, updated_at = $6, completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.processed_items as i32)
        .bind(job.sent_items as i32)
        .bind(job.failed_items as i32)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(DispatchStoreError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        requester: PrincipalId,
        key: &str,
        created_after: DateTime<Utc>,
    ) -> Result<Option<Job>, DispatchStoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM dispatch_jobs
            WHERE requester = $1 AND idempotency_key = $2 AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(requester.as_uuid())
        .bind(key)
        .bind(created_after)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_idempotency_key", e))?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn claim_queued_items(
        &self,
        job_id: JobId,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Item>, DispatchStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE dispatch_items
            SET locked_until = $4
            WHERE id IN (
                SELECT id FROM dispatch_items
                WHERE job_id = $1
                  AND status = 'queued'
                  AND (locked_until IS NULL OR locked_until < $3)
                ORDER BY created_at ASC, id ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(limit as i64)
        .bind(now)
        .bind(lease_until)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_queued_items", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row_to_item(&row)?);
        }
        // RETURNING does not guarantee order; restore FIFO.
        items.sort_by_key(|i| (i.created_at, *i.id.as_uuid()));
        Ok(items)
    }

    async fn update_item(&self, item: &Item) -> Result<(), DispatchStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_items
            SET status = $2, email_id = $3, content_hash = $4,
                archived = $5, recolored = $6, error = $7,
                locked_until = NULL, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.status.as_str())
        .bind(item.email_id.map(|id| *id.as_uuid()))
        .bind(item.content_hash.as_deref())
        .bind(item.archived)
        .bind(item.recolored)
        .bind(item.error.as_deref())
        .bind(item.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(DispatchStoreError::NotFound(format!("item {}", item.id)));
        }
        Ok(())
    }

    async fn insert_email(&self, email: &Email) -> Result<(), DispatchStoreError> {
        sqlx::query(
            r#"
            INSERT INTO dispatch_emails (
                id, job_id, recipient, subject, body, attachment_count,
                total_size, status, provider_message_id, error,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(email.id.as_uuid())
        .bind(email.job_id.as_uuid())
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.attachment_count as i32)
        .bind(email.total_size as i64)
        .bind(email.status.as_str())
        .bind(email.provider_message_id.as_deref())
        .bind(email.error.as_deref())
        .bind(email.created_at)
        .bind(email.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_email", e))?;
        Ok(())
    }

    async fn update_email(&self, email: &Email) -> Result<(), DispatchStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_emails
            SET status = $2, provider_message_id = $3, error = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(email.id.as_uuid())
        .bind(email.status.as_str())
        .bind(email.provider_message_id.as_deref())
        .bind(email.error.as_deref())
        .bind(email.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_email", e))?;

        if result.rows_affected() == 0 {
            return Err(DispatchStoreError::NotFound(format!("email {}", email.id)));
        }
        Ok(())
    }

    async fn item_stats(&self, job_id: JobId) -> Result<ItemStats, DispatchStoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM dispatch_items
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_stats", e))?;

        Ok(ItemStats {
            total: row.try_get::<i64, _>("total").map_err(row_error)? as u64,
            queued: row.try_get::<i64, _>("queued").map_err(row_error)? as u64,
            sent: row.try_get::<i64, _>("sent").map_err(row_error)? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(row_error)? as u64,
        })
    }

    async fn list_jobs(
        &self,
        requester: Option<PrincipalId>,
        limit: u32,
        offset: u32,
    ) -> Result<JobListing, DispatchStoreError> {
        let count_row = sqlx::query(
            "SELECT COUNT(*) AS total FROM dispatch_jobs WHERE $1::uuid IS NULL OR requester = $1",
        )
        .bind(requester.map(|r| *r.as_uuid()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_jobs", e))?;
        let total = count_row.try_get::<i64, _>("total").map_err(row_error)? as u64;

        let rows = sqlx::query(
            r#"
            SELECT * FROM dispatch_jobs
            WHERE $1::uuid IS NULL OR requester = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(requester.map(|r| *r.as_uuid()))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_jobs", e))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(row_to_job(&row)?);
        }
        Ok(JobListing { jobs, total })
    }

    async fn list_items(&self, job_id: JobId) -> Result<Vec<Item>, DispatchStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM dispatch_items WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn list_emails(&self, job_id: JobId) -> Result<Vec<Email>, DispatchStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM dispatch_emails WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_emails", e))?;

        let mut emails = Vec::with_capacity(rows.len());
        for row in rows {
            emails.push(row_to_email(&row)?);
        }
        Ok(emails)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DispatchStoreError {
    DispatchStoreError::Storage(format!("{operation}: {err}"))
}

fn row_error(err: sqlx::Error) -> DispatchStoreError {
    DispatchStoreError::Storage(format!("row decode: {err}"))
}

fn job_status_from_str(s: &str) -> Result<JobStatus, DispatchStoreError> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "sent" => Ok(JobStatus::Sent),
        "partial" => Ok(JobStatus::Partial),
        "failed" => Ok(JobStatus::Failed),
        other => Err(DispatchStoreError::Storage(format!(
            "unknown job status '{other}'"
        ))),
    }
}

fn item_status_from_str(s: &str) -> Result<ItemStatus, DispatchStoreError> {
    match s {
        "queued" => Ok(ItemStatus::Queued),
        "sent" => Ok(ItemStatus::Sent),
        "failed" => Ok(ItemStatus::Failed),
        other => Err(DispatchStoreError::Storage(format!(
            "unknown item status '{other}'"
        ))),
    }
}

fn email_status_from_str(s: &str) -> Result<EmailStatus, DispatchStoreError> {
    match s {
        "sending" => Ok(EmailStatus::Sending),
        "sent" => Ok(EmailStatus::Sent),
        "failed" => Ok(EmailStatus::Failed),
        other => Err(DispatchStoreError::Storage(format!(
            "unknown email status '{other}'"
        ))),
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, DispatchStoreError> {
    let status: String = row.try_get("status").map_err(row_error)?;
    let mode: String = row.try_get("mode").map_err(row_error)?;
    let source: serde_json::Value = row.try_get("source").map_err(row_error)?;
    let settings: serde_json::Value = row.try_get("settings").map_err(row_error)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(row_error)?),
        requester: PrincipalId::from_uuid(row.try_get("requester").map_err(row_error)?),
        status: job_status_from_str(&status)?,
        mode: JobMode::parse(&mode)
            .map_err(|e| DispatchStoreError::Storage(format!("job mode: {e}")))?,
        source: serde_json::from_value(source)
            .map_err(|e| DispatchStoreError::Storage(format!("deserialize source: {e}")))?,
        total_items: row.try_get::<i32, _>("total_items").map_err(row_error)? as u32,
        processed_items: row.try_get::<i32, _>("processed_items").map_err(row_error)? as u32,
        sent_items: row.try_get::<i32, _>("sent_items").map_err(row_error)? as u32,
        failed_items: row.try_get::<i32, _>("failed_items").map_err(row_error)? as u32,
        settings: serde_json::from_value(settings)
            .map_err(|e| DispatchStoreError::Storage(format!("deserialize settings: {e}")))?,
        idempotency_key: row.try_get("idempotency_key").map_err(row_error)?,
        target_address: row.try_get("target_address").map_err(row_error)?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
        completed_at: row.try_get("completed_at").map_err(row_error)?,
    })
}

fn row_to_item(row: &sqlx::postgres::PgRow) -> Result<Item, DispatchStoreError> {
    let status: String = row.try_get("status").map_err(row_error)?;
    let email_id: Option<uuid::Uuid> = row.try_get("email_id").map_err(row_error)?;

    Ok(Item {
        id: ItemId::from_uuid(row.try_get("id").map_err(row_error)?),
        job_id: JobId::from_uuid(row.try_get("job_id").map_err(row_error)?),
        document_id: DocumentId::from_uuid(row.try_get("document_id").map_err(row_error)?),
        filename: row.try_get("filename").map_err(row_error)?,
        locator: row.try_get("locator").map_err(row_error)?,
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(row_error)? as u64,
        status: item_status_from_str(&status)?,
        email_id: email_id.map(EmailId::from_uuid),
        content_hash: row.try_get("content_hash").map_err(row_error)?,
        archived: row.try_get("archived").map_err(row_error)?,
        recolored: row.try_get("recolored").map_err(row_error)?,
        error: row.try_get("error").map_err(row_error)?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
    })
}

fn row_to_email(row: &sqlx::postgres::PgRow) -> Result<Email, DispatchStoreError> {
    let status: String = row.try_get("status").map_err(row_error)?;

    Ok(Email {
        id: EmailId::from_uuid(row.try_get("id").map_err(row_error)?),
        job_id: JobId::from_uuid(row.try_get("job_id").map_err(row_error)?),
        recipient: row.try_get("recipient").map_err(row_error)?,
        subject: row.try_get("subject").map_err(row_error)?,
        body: row.try_get("body").map_err(row_error)?,
        attachment_count: row.try_get::<i32, _>("attachment_count").map_err(row_error)? as u32,
        total_size: row.try_get::<i64, _>("total_size").map_err(row_error)? as u64,
        status: email_status_from_str(&status)?,
        provider_message_id: row.try_get("provider_message_id").map_err(row_error)?,
        error: row.try_get("error").map_err(row_error)?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
    })
}
