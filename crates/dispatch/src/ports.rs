//! Collaborator ports consumed by the dispatch engine.
//!
//! Document storage, the SMTP transport, settings persistence and the audit
//! trail are external systems; the engine only sees these traits. Adapters
//! live in `mailroom-infra`, in-memory doubles in [`crate::doubles`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mailroom_auth::PrincipalId;
use mailroom_core::{DocumentId, EmailId, JobId};

use crate::job::{JobMode, JobStatus};
use crate::settings::DispatchSettings;

/// Resolved metadata of an archived document.
///
/// Snapshotted into items at job creation; never re-read live afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Backend-specific locator used to load the content at send time.
    pub locator: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Source collection the document belongs to.
    pub collection: String,
}

/// One attachment of an outgoing email.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// The backing file is absent at send time.
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("document store error: {0}")]
    Backend(String),
}

/// Locate-by-id blob store holding the archived documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve a document id to its metadata. Unknown ids resolve to `None`.
    async fn resolve(&self, id: DocumentId) -> Result<Option<DocumentMeta>, DocumentStoreError>;

    /// Resolve a named source collection to its member documents.
    async fn list_collection(
        &self,
        name: &str,
    ) -> Result<Vec<(DocumentId, DocumentMeta)>, DocumentStoreError>;

    /// Load document content by its locator (at send time).
    async fn load(&self, locator: &str) -> Result<Vec<u8>, DocumentStoreError>;

    /// Best-effort post-send side effect: mark documents archived.
    async fn set_archived(&self, ids: &[DocumentId]) -> Result<(), DocumentStoreError>;

    /// Best-effort post-send side effect: recolor documents.
    async fn set_color(&self, ids: &[DocumentId], color: &str) -> Result<(), DocumentStoreError>;
}

/// Receipt returned by the mail transport on a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// Any transport-level failure (connect, auth, rejected message).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outgoing mail transport (SMTP in production).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        account: &str,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[Attachment],
    ) -> Result<SendReceipt, MailerError>;
}

/// Read-only snapshot of the dispatch configuration.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> DispatchSettings;
}

/// Events recorded on the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum AuditEvent {
    JobCreated {
        job_id: JobId,
        requester: PrincipalId,
        mode: JobMode,
        total_items: u32,
    },
    EmailSent {
        job_id: JobId,
        email_id: EmailId,
        attachment_count: u32,
    },
    EmailFailed {
        job_id: JobId,
        email_id: EmailId,
        error: String,
    },
    JobFinalized {
        job_id: JobId,
        status: JobStatus,
    },
}

/// Append-only audit trail. Recording is fire-and-forget; audit failures
/// never affect dispatch outcomes.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent);
}
