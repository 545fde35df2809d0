//! In-memory collaborator implementations.
//!
//! Intended for tests/dev, mirroring production behavior closely enough to
//! exercise the engine: documents can be registered with or without content
//! (absent content simulates a missing backing file), and the mailer can be
//! scripted to fail per attachment filename.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use mailroom_core::DocumentId;

use crate::ports::{
    Attachment, AuditEvent, AuditLog, DocumentMeta, DocumentStore, DocumentStoreError, Mailer,
    MailerError, SendReceipt, SettingsProvider,
};
use crate::settings::DispatchSettings;

/// In-memory document store.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, (DocumentMeta, Option<Vec<u8>>)>>,
    archived: RwLock<HashSet<DocumentId>>,
    colors: RwLock<HashMap<DocumentId, String>>,
    fail_side_effects: RwLock<bool>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document with content.
    pub fn insert(&self, id: DocumentId, meta: DocumentMeta, content: Vec<u8>) {
        self.documents
            .write()
            .unwrap()
            .insert(id, (meta, Some(content)));
    }

    /// Register a document whose backing file is missing at send time.
    pub fn insert_without_content(&self, id: DocumentId, meta: DocumentMeta) {
        self.documents.write().unwrap().insert(id, (meta, None));
    }

    /// Make archive/recolor side effects fail (the engine must not care).
    pub fn fail_side_effects(&self) {
        *self.fail_side_effects.write().unwrap() = true;
    }

    pub fn is_archived(&self, id: DocumentId) -> bool {
        self.archived.read().unwrap().contains(&id)
    }

    pub fn color_of(&self, id: DocumentId) -> Option<String> {
        self.colors.read().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn resolve(&self, id: DocumentId) -> Result<Option<DocumentMeta>, DocumentStoreError> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .get(&id)
            .map(|(meta, _)| meta.clone()))
    }

    async fn list_collection(
        &self,
        name: &str,
    ) -> Result<Vec<(DocumentId, DocumentMeta)>, DocumentStoreError> {
        let documents = self.documents.read().unwrap();
        let mut members: Vec<_> = documents
            .iter()
            .filter(|(_, (meta, _))| meta.collection == name)
            .map(|(id, (meta, _))| (*id, meta.clone()))
            .collect();
        // Stable order for deterministic tests; ids are time-ordered.
        members.sort_by_key(|(id, _)| *id.as_uuid());
        Ok(members)
    }

    async fn load(&self, locator: &str) -> Result<Vec<u8>, DocumentStoreError> {
        let documents = self.documents.read().unwrap();
        let entry = documents
            .values()
            .find(|(meta, _)| meta.locator == locator);
        match entry {
            Some((_, Some(content))) => Ok(content.clone()),
            _ => Err(DocumentStoreError::NotFound(format!(
                "file not found: {locator}"
            ))),
        }
    }

    async fn set_archived(&self, ids: &[DocumentId]) -> Result<(), DocumentStoreError> {
        if *self.fail_side_effects.read().unwrap() {
            return Err(DocumentStoreError::Backend("archive failed".to_string()));
        }
        self.archived.write().unwrap().extend(ids.iter().copied());
        Ok(())
    }

    async fn set_color(&self, ids: &[DocumentId], color: &str) -> Result<(), DocumentStoreError> {
        if *self.fail_side_effects.read().unwrap() {
            return Err(DocumentStoreError::Backend("recolor failed".to_string()));
        }
        let mut colors = self.colors.write().unwrap();
        for id in ids {
            colors.insert(*id, color.to_string());
        }
        Ok(())
    }
}

/// A message captured by [`ScriptedMailer`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub account: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_filenames: Vec<String>,
}

/// Mailer double that records every send and can be scripted to fail
/// whenever a named attachment is present.
#[derive(Debug, Default)]
pub struct ScriptedMailer {
    sent: Mutex<Vec<SentMail>>,
    fail_on: Mutex<HashSet<String>>,
    counter: Mutex<u64>,
}

impl ScriptedMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any send carrying an attachment with this filename.
    pub fn fail_on_attachment(&self, filename: impl Into<String>) {
        self.fail_on.lock().unwrap().insert(filename.into());
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for ScriptedMailer {
    async fn send(
        &self,
        account: &str,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[Attachment],
    ) -> Result<SendReceipt, MailerError> {
        {
            let fail_on = self.fail_on.lock().unwrap();
            if let Some(bad) = attachments.iter().find(|a| fail_on.contains(&a.filename)) {
                return Err(MailerError::Transport(format!(
                    "smtp rejected message carrying {}",
                    bad.filename
                )));
            }
        }

        self.sent.lock().unwrap().push(SentMail {
            account: account.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            attachment_filenames: attachments.iter().map(|a| a.filename.clone()).collect(),
        });

        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(SendReceipt {
            message_id: format!("<test-{counter}@mailroom>"),
        })
    }
}

/// Settings provider returning a fixed configuration value.
#[derive(Debug, Clone)]
pub struct StaticSettings(pub DispatchSettings);

impl SettingsProvider for StaticSettings {
    fn current(&self) -> DispatchSettings {
        self.0.clone()
    }
}

/// Audit log double that keeps recorded events in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str, collection: &str) -> DocumentMeta {
        DocumentMeta {
            locator: format!("mem/{filename}"),
            filename: filename.to_string(),
            size_bytes: 3,
            collection: collection.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_content_surfaces_as_not_found() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        store.insert_without_content(id, meta("a.pdf", "outbox"));

        assert!(store.resolve(id).await.unwrap().is_some());
        assert!(matches!(
            store.load("mem/a.pdf").await,
            Err(DocumentStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn scripted_mailer_fails_per_attachment() {
        let mailer = ScriptedMailer::new();
        mailer.fail_on_attachment("bad.pdf");

        let good = [Attachment {
            filename: "good.pdf".to_string(),
            content: vec![1],
        }];
        let bad = [Attachment {
            filename: "bad.pdf".to_string(),
            content: vec![2],
        }];

        assert!(mailer
            .send("acct", "to@x", "s", "b", &good)
            .await
            .is_ok());
        assert!(mailer.send("acct", "to@x", "s", "b", &bad).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }
}
