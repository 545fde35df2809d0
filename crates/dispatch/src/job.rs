//! The dispatch job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mailroom_auth::PrincipalId;
use mailroom_core::{DocumentId, DomainError, DomainResult, JobId};

use crate::settings::SettingsSnapshot;

/// How documents are mapped onto outgoing emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// One email per document.
    Single,
    /// Several documents per email, grouped under count/size limits.
    Batch,
}

impl JobMode {
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "single" => Ok(Self::Single),
            "batch" => Ok(Self::Batch),
            other => Err(DomainError::validation(format!("unknown mode '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

/// What the job was asked to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSelector {
    /// An explicit list of document ids.
    Documents(Vec<DocumentId>),
    /// A named source collection resolved through the document store.
    Collection(String),
}

/// Job execution status. Transitions only move forward:
/// `queued → processing → {sent | partial | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, no chunk has claimed items yet.
    Queued,
    /// At least one chunk has run; items may still be queued.
    Processing,
    /// Every item was sent.
    Sent,
    /// Some items sent, some failed.
    Partial,
    /// Every item failed (or the job never processed anything).
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Partial | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// One dispatch request covering a set of documents.
///
/// Created once, never deleted (audit trail). Counters are advanced
/// additively by the chunk processor; the final status is set exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub requester: PrincipalId,
    pub status: JobStatus,
    pub mode: JobMode,
    pub source: SourceSelector,
    pub total_items: u32,
    pub processed_items: u32,
    pub sent_items: u32,
    pub failed_items: u32,
    /// Settings frozen at creation; concurrent config edits never affect
    /// in-flight jobs.
    pub settings: SettingsSnapshot,
    pub idempotency_key: Option<String>,
    pub target_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        requester: PrincipalId,
        mode: JobMode,
        source: SourceSelector,
        total_items: u32,
        settings: SettingsSnapshot,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let target_address = settings.target_address.clone();
        Self {
            id: JobId::new(),
            requester,
            status: JobStatus::Queued,
            mode,
            source,
            total_items,
            processed_items: 0,
            sent_items: 0,
            failed_items: 0,
            settings,
            idempotency_key,
            target_address,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn remaining_items(&self) -> u32 {
        self.total_items.saturating_sub(self.processed_items)
    }

    /// First chunk claim: `queued → processing`. A no-op if already processing.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            JobStatus::Queued => {
                self.status = JobStatus::Processing;
                self.updated_at = now;
                Ok(())
            }
            JobStatus::Processing => Ok(()),
            terminal => Err(DomainError::validation(format!(
                "job {} is already {}",
                self.id,
                terminal.as_str()
            ))),
        }
    }

    /// Advance counters additively after a chunk. `sent + failed` must equal
    /// `processed` for the chunk, and counters never exceed `total_items`.
    pub fn apply_chunk(&mut self, sent: u32, failed: u32, now: DateTime<Utc>) -> DomainResult<()> {
        let processed = sent + failed;
        if self.processed_items + processed > self.total_items {
            return Err(DomainError::invariant(format!(
                "job {}: processed {} + chunk {} exceeds total {}",
                self.id, self.processed_items, processed, self.total_items
            )));
        }
        self.processed_items += processed;
        self.sent_items += sent;
        self.failed_items += failed;
        self.updated_at = now;
        Ok(())
    }

    /// Set the terminal status. Idempotent when the same terminal status is
    /// applied again; rejects any other transition out of a terminal state.
    pub fn mark_terminal(&mut self, status: JobStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "{} is not a terminal status",
                status.as_str()
            )));
        }
        if self.status.is_terminal() {
            if self.status == status {
                return Ok(());
            }
            return Err(DomainError::invariant(format!(
                "job {} is {} and cannot become {}",
                self.id,
                self.status.as_str(),
                status.as_str()
            )));
        }
        self.status = status;
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(())
    }
}
