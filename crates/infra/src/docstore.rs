//! Filesystem-backed document store adapter.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

use mailroom_core::DocumentId;
use mailroom_dispatch::{DocumentMeta, DocumentStore, DocumentStoreError};

/// Document store reading content from a directory tree.
///
/// Metadata (id → locator/filename/size/collection) is registered up front;
/// content is read from `<root>/<locator>` at send time, so a file deleted
/// between job creation and sending surfaces as the missing-file failure the
/// engine expects. Archive/recolor marks are kept in memory — in production
/// the archive system itself owns that state.
pub struct FsDocumentStore {
    root: PathBuf,
    registry: RwLock<HashMap<DocumentId, DocumentMeta>>,
    archived: RwLock<HashSet<DocumentId>>,
    colors: RwLock<HashMap<DocumentId, String>>,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: RwLock::new(HashMap::new()),
            archived: RwLock::new(HashSet::new()),
            colors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a document's metadata snapshot source.
    pub fn register(&self, id: DocumentId, meta: DocumentMeta) {
        self.registry.write().unwrap().insert(id, meta);
    }

    pub fn is_archived(&self, id: DocumentId) -> bool {
        self.archived.read().unwrap().contains(&id)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn resolve(&self, id: DocumentId) -> Result<Option<DocumentMeta>, DocumentStoreError> {
        Ok(self.registry.read().unwrap().get(&id).cloned())
    }

    async fn list_collection(
        &self,
        name: &str,
    ) -> Result<Vec<(DocumentId, DocumentMeta)>, DocumentStoreError> {
        let registry = self.registry.read().unwrap();
        let mut members: Vec<_> = registry
            .iter()
            .filter(|(_, meta)| meta.collection == name)
            .map(|(id, meta)| (*id, meta.clone()))
            .collect();
        members.sort_by_key(|(id, _)| *id.as_uuid());
        Ok(members)
    }

    async fn load(&self, locator: &str) -> Result<Vec<u8>, DocumentStoreError> {
        let path = self.root.join(locator);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                DocumentStoreError::NotFound(format!("file not found: {}", path.display())),
            ),
            Err(err) => Err(DocumentStoreError::Backend(format!(
                "read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn set_archived(&self, ids: &[DocumentId]) -> Result<(), DocumentStoreError> {
        self.archived.write().unwrap().extend(ids.iter().copied());
        Ok(())
    }

    async fn set_color(&self, ids: &[DocumentId], color: &str) -> Result<(), DocumentStoreError> {
        let mut colors = self.colors.write().unwrap();
        for id in ids {
            colors.insert(*id, color.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_registered_files_and_flags_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("present.pdf"), b"content")
            .await
            .unwrap();

        let store = FsDocumentStore::new(dir.path());
        let id = DocumentId::new();
        store.register(
            id,
            DocumentMeta {
                locator: "present.pdf".to_string(),
                filename: "present.pdf".to_string(),
                size_bytes: 7,
                collection: "outbox".to_string(),
            },
        );

        assert_eq!(store.load("present.pdf").await.unwrap(), b"content");
        assert!(matches!(
            store.load("gone.pdf").await,
            Err(DocumentStoreError::NotFound(_))
        ));
        assert!(store.resolve(id).await.unwrap().is_some());
    }
}
