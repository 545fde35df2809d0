//! In-memory dispatch store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailroom_auth::PrincipalId;
use mailroom_core::{EmailId, ItemId, JobId};
use mailroom_dispatch::{Email, Item, ItemStatus, Job};

use super::{DispatchStore, DispatchStoreError, ItemStats, JobListing};

#[derive(Debug, Clone)]
struct StoredItem {
    item: Item,
    lease_until: Option<DateTime<Utc>>,
}

/// In-memory store. Not optimized for performance; the claim path mirrors
/// the conditional-update semantics of the Postgres store.
#[derive(Debug, Default)]
pub struct InMemoryDispatchStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    items: RwLock<HashMap<ItemId, StoredItem>>,
    emails: RwLock<HashMap<EmailId, Email>>,
}

impl InMemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchStore for InMemoryDispatchStore {
    async fn create_job(&self, job: &Job, items: &[Item]) -> Result<(), DispatchStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(DispatchStoreError::Storage(format!(
                "job already exists: {}",
                job.id
            )));
        }
        // Both maps are updated under the jobs lock, so the insert is
        // all-or-nothing from the engine's point of view.
        let mut stored_items = self.items.write().unwrap();
        jobs.insert(job.id, job.clone());
        for item in items {
            stored_items.insert(
                item.id,
                StoredItem {
                    item: item.clone(),
                    lease_until: None,
                },
            );
        }
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, DispatchStoreError> {
        Ok(self.jobs.read().unwrap().get(&job_id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), DispatchStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(DispatchStoreError::JobNotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        requester: PrincipalId,
        key: &str,
        created_after: DateTime<Utc>,
    ) -> Result<Option<Job>, DispatchStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut matches: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.requester == requester
                    && j.idempotency_key.as_deref() == Some(key)
                    && j.created_at >= created_after
            })
            .collect();
        matches.sort_by_key(|j| j.created_at);
        Ok(matches.last().map(|j| (*j).clone()))
    }

    async fn claim_queued_items(
        &self,
        job_id: JobId,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<Item>, DispatchStoreError> {
        let mut items = self.items.write().unwrap();

        let mut claimable: Vec<ItemId> = items
            .values()
            .filter(|s| {
                s.item.job_id == job_id
                    && s.item.status == ItemStatus::Queued
                    && s.lease_until.is_none_or(|until| until < now)
            })
            .map(|s| s.item.id)
            .collect();

        // FIFO by creation order; id breaks ties (UUIDv7, time-ordered).
        claimable.sort_by_key(|id| {
            let s = &items[id];
            (s.item.created_at, *s.item.id.as_uuid())
        });
        claimable.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(claimable.len());
        for id in claimable {
            let stored = items.get_mut(&id).expect("claimable id came from the map");
            stored.lease_until = Some(lease_until);
            claimed.push(stored.item.clone());
        }
        Ok(claimed)
    }

    async fn update_item(&self, item: &Item) -> Result<(), DispatchStoreError> {
        let mut items = self.items.write().unwrap();
        let stored = items
            .get_mut(&item.id)
            .ok_or_else(|| DispatchStoreError::NotFound(format!("item {}", item.id)))?;
        stored.item = item.clone();
        stored.lease_until = None;
        Ok(())
    }

    async fn insert_email(&self, email: &Email) -> Result<(), DispatchStoreError> {
        self.emails
            .write()
            .unwrap()
            .insert(email.id, email.clone());
        Ok(())
    }

    async fn update_email(&self, email: &Email) -> Result<(), DispatchStoreError> {
        let mut emails = self.emails.write().unwrap();
        if !emails.contains_key(&email.id) {
            return Err(DispatchStoreError::NotFound(format!("email {}", email.id)));
        }
        emails.insert(email.id, email.clone());
        Ok(())
    }

    async fn item_stats(&self, job_id: JobId) -> Result<ItemStats, DispatchStoreError> {
        let items = self.items.read().unwrap();
        let mut stats = ItemStats::default();
        for stored in items.values().filter(|s| s.item.job_id == job_id) {
            stats.total += 1;
            match stored.item.status {
                ItemStatus::Queued => stats.queued += 1,
                ItemStatus::Sent => stats.sent += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn list_jobs(
        &self,
        requester: Option<PrincipalId>,
        limit: u32,
        offset: u32,
    ) -> Result<JobListing, DispatchStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut matching: Vec<_> = jobs
            .values()
            .filter(|j| requester.is_none_or(|r| j.requester == r))
            .cloned()
            .collect();

        matching.sort_by_key(|j| std::cmp::Reverse((j.created_at, *j.id.as_uuid())));
        let total = matching.len() as u64;
        let jobs = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(JobListing { jobs, total })
    }

    async fn list_items(&self, job_id: JobId) -> Result<Vec<Item>, DispatchStoreError> {
        let items = self.items.read().unwrap();
        let mut matching: Vec<_> = items
            .values()
            .filter(|s| s.item.job_id == job_id)
            .map(|s| s.item.clone())
            .collect();
        matching.sort_by_key(|i| (i.created_at, *i.id.as_uuid()));
        Ok(matching)
    }

    async fn list_emails(&self, job_id: JobId) -> Result<Vec<Email>, DispatchStoreError> {
        let emails = self.emails.read().unwrap();
        let mut matching: Vec<_> = emails
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| (e.created_at, *e.id.as_uuid()));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use mailroom_core::DocumentId;
    use mailroom_dispatch::{DispatchSettings, DocumentMeta, JobMode, SourceSelector};

    use super::*;

    fn job_with_items(total: usize) -> (Job, Vec<Item>) {
        let settings = DispatchSettings {
            enabled: true,
            account: Some("smtp-main".to_string()),
            target_address: Some("intake@example.test".to_string()),
            ..DispatchSettings::default()
        }
        .freeze()
        .unwrap();
        let job = Job::new(
            PrincipalId::new(),
            JobMode::Single,
            SourceSelector::Collection("outbox".to_string()),
            total as u32,
            settings,
            None,
        );
        let items = (0..total)
            .map(|i| {
                Item::new(
                    job.id,
                    DocumentId::new(),
                    &DocumentMeta {
                        locator: format!("mem/doc-{i}.pdf"),
                        filename: format!("doc-{i}.pdf"),
                        size_bytes: 100,
                        collection: "outbox".to_string(),
                    },
                )
            })
            .collect();
        (job, items)
    }

    #[tokio::test]
    async fn claim_is_fifo_and_leases() {
        let store = InMemoryDispatchStore::new();
        let (job, items) = job_with_items(3);
        store.create_job(&job, &items).await.unwrap();

        let now = Utc::now();
        let lease = now + Duration::minutes(5);

        let first = store.claim_queued_items(job.id, 2, now, lease).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, items[0].id);
        assert_eq!(first[1].id, items[1].id);

        // A concurrent claim cannot see leased items.
        let second = store.claim_queued_items(job.id, 2, now, lease).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, items[2].id);

        // Everything is leased now.
        assert!(store
            .claim_queued_items(job.id, 2, now, lease)
            .await
            .unwrap()
            .is_empty());

        // Leases expire: a later claim sees still-queued items again.
        let later = lease + Duration::seconds(1);
        let reclaimed = store
            .claim_queued_items(job.id, 10, later, later + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 3);
    }

    #[tokio::test]
    async fn update_item_releases_lease_and_settles_status() {
        let store = InMemoryDispatchStore::new();
        let (job, items) = job_with_items(1);
        store.create_job(&job, &items).await.unwrap();

        let now = Utc::now();
        let mut claimed = store
            .claim_queued_items(job.id, 10, now, now + Duration::minutes(5))
            .await
            .unwrap();
        let mut item = claimed.remove(0);
        item.mark_failed("file not found", now).unwrap();
        store.update_item(&item).await.unwrap();

        // Terminal items are never claimable again, lease or not.
        assert!(store
            .claim_queued_items(job.id, 10, now, now + Duration::minutes(5))
            .await
            .unwrap()
            .is_empty());

        let stats = store.item_stats(job.id).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn idempotency_lookup_scoped_by_requester_and_window() {
        let store = InMemoryDispatchStore::new();
        let (mut job, items) = job_with_items(1);
        job.idempotency_key = Some("abc".to_string());
        store.create_job(&job, &items).await.unwrap();

        let window_start = job.created_at - Duration::minutes(10);
        let found = store
            .find_by_idempotency_key(job.requester, "abc", window_start)
            .await
            .unwrap();
        assert_eq!(found.map(|j| j.id), Some(job.id));

        // Different requester or expired window: no match.
        assert!(store
            .find_by_idempotency_key(PrincipalId::new(), "abc", window_start)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_idempotency_key(job.requester, "abc", job.created_at + Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn listing_scopes_and_pages() {
        let store = InMemoryDispatchStore::new();
        let (job_a, items_a) = job_with_items(1);
        let (job_b, items_b) = job_with_items(1);
        store.create_job(&job_a, &items_a).await.unwrap();
        store.create_job(&job_b, &items_b).await.unwrap();

        let all = store.list_jobs(None, 10, 0).await.unwrap();
        assert_eq!(all.total, 2);

        let own = store.list_jobs(Some(job_a.requester), 10, 0).await.unwrap();
        assert_eq!(own.total, 1);
        assert_eq!(own.jobs[0].id, job_a.id);

        let paged = store.list_jobs(None, 1, 1).await.unwrap();
        assert_eq!(paged.total, 2);
        assert_eq!(paged.jobs.len(), 1);
    }
}
