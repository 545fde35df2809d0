//! One outgoing message (one send attempt).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mailroom_core::{DomainError, DomainResult, EmailId, JobId};

/// Email status: `sending → {sent | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// One outgoing email carrying one (single mode) or several (batch mode)
/// items as attachments. Created per send attempt, mutated once on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub job_id: JobId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment_count: u32,
    pub total_size: u64,
    pub status: EmailStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Email {
    pub fn new(
        job_id: JobId,
        recipient: String,
        subject: String,
        body: String,
        attachment_count: u32,
        total_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EmailId::new(),
            job_id,
            recipient,
            subject,
            body,
            attachment_count,
            total_size,
            status: EmailStatus::Sending,
            provider_message_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_sent(&mut self, message_id: String, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_sending()?;
        self.status = EmailStatus::Sent;
        self.provider_message_id = Some(message_id);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_sending()?;
        self.status = EmailStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        Ok(())
    }

    fn ensure_sending(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "email {} is already {}",
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

    #[test]
    fn completion_is_one_shot() {
        let mut email = Email::new(
            JobId::new(),
            "intake@example.test".to_string(),
            "subject".to_string(),
            "body".to_string(),
            2,
            8192,
        );
        let now = Utc::now();

        email.mark_sent("<msg-1@mail>".to_string(), now).unwrap();
        assert_eq!(email.status, EmailStatus::Sent);
        assert!(email.mark_failed("too late", now).is_err());
    }
}
