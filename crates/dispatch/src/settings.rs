//! Dispatch configuration and the per-job frozen snapshot.

use serde::{Deserialize, Serialize};

use mailroom_core::{DomainError, DomainResult};

/// Current dispatch configuration as exposed by the settings provider.
///
/// `account` and `target_address` are optional here because the back office
/// may not have finished configuring the mailbox; job creation validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Master switch; when false, job creation is rejected.
    pub enabled: bool,
    /// Sending account identifier handed to the mailer.
    pub account: Option<String>,
    /// Intake mailbox address documents are forwarded to.
    pub target_address: Option<String>,
    /// Subject template; `{box} {date} {count} {user}` are substituted.
    pub subject_template: String,
    /// Body template; same placeholders as the subject.
    pub body_template: String,
    /// Maximum attachments per email in batch mode.
    pub max_attachments: u32,
    /// Maximum total attachment bytes per email in batch mode.
    pub max_total_bytes: u64,
    /// Mark documents archived after a successful send.
    pub archive_after_send: bool,
    /// Recolor documents after a successful send.
    pub recolor_after_send: bool,
    /// Color applied when `recolor_after_send` is set.
    pub recolor_color: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            account: None,
            target_address: None,
            subject_template: "Documents {box} {date}".to_string(),
            body_template: "{count} document(s) forwarded by {user} on {date}.".to_string(),
            max_attachments: 10,
            max_total_bytes: 25 * 1024 * 1024,
            archive_after_send: false,
            recolor_after_send: false,
            recolor_color: "green".to_string(),
        }
    }
}

impl DispatchSettings {
    /// Validate and freeze the current settings into a per-job snapshot.
    ///
    /// Jobs carry the snapshot so concurrent configuration edits never
    /// retroactively affect in-flight work.
    pub fn freeze(&self) -> DomainResult<SettingsSnapshot> {
        if !self.enabled {
            return Err(DomainError::configuration("document dispatch is disabled"));
        }
        let account = self
            .account
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DomainError::configuration("no sending account configured"))?;
        let target_address = self
            .target_address
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DomainError::configuration("no target address configured"))?;
        if self.max_attachments == 0 {
            return Err(DomainError::configuration("max_attachments must be >= 1"));
        }

        Ok(SettingsSnapshot {
            account: account.to_string(),
            target_address: target_address.to_string(),
            subject_template: self.subject_template.clone(),
            body_template: self.body_template.clone(),
            max_attachments: self.max_attachments,
            max_total_bytes: self.max_total_bytes,
            archive_after_send: self.archive_after_send,
            recolor_after_send: self.recolor_after_send,
            recolor_color: self.recolor_color.clone(),
        })
    }
}

/// Immutable settings snapshot stored on a job at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub account: String,
    pub target_address: String,
    pub subject_template: String,
    pub body_template: String,
    pub max_attachments: u32,
    pub max_total_bytes: u64,
    pub archive_after_send: bool,
    pub recolor_after_send: bool,
    pub recolor_color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> DispatchSettings {
        DispatchSettings {
            enabled: true,
            account: Some("smtp-main".to_string()),
            target_address: Some("intake@example.test".to_string()),
            ..DispatchSettings::default()
        }
    }

    #[test]
    fn freeze_requires_enabled() {
        let settings = DispatchSettings::default();
        assert!(matches!(
            settings.freeze(),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn freeze_requires_account_and_target() {
        let mut settings = enabled();
        settings.account = None;
        assert!(settings.freeze().is_err());

        let mut settings = enabled();
        settings.target_address = Some("   ".to_string());
        assert!(settings.freeze().is_err());
    }

    #[test]
    fn freeze_copies_values() {
        let snapshot = enabled().freeze().unwrap();
        assert_eq!(snapshot.account, "smtp-main");
        assert_eq!(snapshot.target_address, "intake@example.test");
        assert_eq!(snapshot.max_attachments, 10);
    }
}
