//! One document within a dispatch job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mailroom_core::{DocumentId, DomainError, DomainResult, EmailId, ItemId, JobId};

use crate::ports::DocumentMeta;

/// Item status: `queued → {sent | failed}`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Sent,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// One document within a job.
///
/// Filename/locator/size are snapshotted at creation and never re-read live.
/// The status is terminal once set; at most one email ever carries an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub job_id: JobId,
    pub document_id: DocumentId,
    pub filename: String,
    pub locator: String,
    pub size_bytes: u64,
    pub status: ItemStatus,
    /// Set exactly once, when the item is sent.
    pub email_id: Option<EmailId>,
    /// SHA-256 of the attachment content, computed at send time.
    pub content_hash: Option<String>,
    pub archived: bool,
    pub recolored: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Snapshot a resolved document into a queued item.
    pub fn new(job_id: JobId, document_id: DocumentId, meta: &DocumentMeta) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            job_id,
            document_id,
            filename: meta.filename.clone(),
            locator: meta.locator.clone(),
            size_bytes: meta.size_bytes,
            status: ItemStatus::Queued,
            email_id: None,
            content_hash: None,
            archived: false,
            recolored: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_sent(
        &mut self,
        email_id: EmailId,
        content_hash: String,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_queued()?;
        self.status = ItemStatus::Sent;
        self.email_id = Some(email_id);
        self.content_hash = Some(content_hash);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_queued()?;
        self.status = ItemStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        Ok(())
    }

    fn ensure_queued(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "item {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        Item::new(
            JobId::new(),
            DocumentId::new(),
            &DocumentMeta {
                locator: "store/2026/doc.pdf".to_string(),
                filename: "doc.pdf".to_string(),
                size_bytes: 4096,
                collection: "outbox".to_string(),
            },
        )
    }

    #[test]
    fn sent_is_terminal() {
        let mut item = item();
        let now = Utc::now();
        item.mark_sent(EmailId::new(), "abc123".to_string(), now)
            .unwrap();
        assert_eq!(item.status, ItemStatus::Sent);
        assert!(item.email_id.is_some());

        assert!(item.mark_failed("late failure", now).is_err());
        assert!(item
            .mark_sent(EmailId::new(), "other".to_string(), now)
            .is_err());
    }

    #[test]
    fn failed_records_error() {
        let mut item = item();
        item.mark_failed("file not found", Utc::now()).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.error.as_deref(), Some("file not found"));
        assert!(item.email_id.is_none());
    }
}
