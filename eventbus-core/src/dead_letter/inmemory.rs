//! 内存版死信存储（InMemoryDeadLetterStore）
//!
//! 生命周期与进程一致，进程退出即丢失。新条目插入队首，
//! 因此 `list` 天然为从新到旧。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DeadLetterEntry, DeadLetterStore};
use crate::error::EventResult;

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn append(&self, entry: DeadLetterEntry) -> EventResult<()> {
        self.entries.lock().await.push_front(entry);
        Ok(())
    }

    async fn list(&self, limit: usize) -> EventResult<Vec<DeadLetterEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().take(limit).cloned().collect())
    }

    async fn remove(&self, event_id: &str) -> EventResult<Vec<DeadLetterEntry>> {
        let mut entries = self.entries.lock().await;
        let (removed, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|e| e.event_id() == event_id);
        *entries = kept;
        Ok(removed.into())
    }

    async fn clear(&self) -> EventResult<usize> {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    async fn len(&self) -> EventResult<usize> {
        Ok(self.entries.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Metadata, PublishContext};
    use serde_json::json;
    use std::sync::Arc;

    fn entry(event: &str, handler: &str) -> DeadLetterEntry {
        let metadata = Metadata::enrich(event, &PublishContext::default());
        DeadLetterEntry::new(handler, json!({"event": event}), metadata, &anyhow::anyhow!("boom"))
    }

    #[tokio::test]
    async fn list_is_most_recent_first_and_limited() {
        let store = InMemoryDeadLetterStore::new();
        store.append(entry("a", "h")).await.unwrap();
        store.append(entry("b", "h")).await.unwrap();
        store.append(entry("c", "h")).await.unwrap();

        let listed = store.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].event_name(), "c");
        assert_eq!(listed[1].event_name(), "b");
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn remove_takes_all_entries_of_an_event() {
        let store = InMemoryDeadLetterStore::new();
        let first = entry("order.created", "mailer");
        let sibling = DeadLetterEntry::new(
            "audit",
            first.payload().clone(),
            first.metadata().clone(),
            &anyhow::anyhow!("also boom"),
        );
        let other = entry("order.paid", "mailer");
        let event_id = first.event_id().to_string();

        store.append(first).await.unwrap();
        store.append(other).await.unwrap();
        store.append(sibling).await.unwrap();

        let removed = store.remove(&event_id).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|e| e.event_id() == event_id));
        assert_eq!(store.len().await.unwrap(), 1);

        // 未知 ID：返回空且不改动存储
        assert!(store.remove("missing").await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let store = InMemoryDeadLetterStore::new();
        store.append(entry("a", "h")).await.unwrap();
        store.append(entry("b", "h")).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.is_empty().await.unwrap());
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_appends_are_not_lost() {
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let mut tasks = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.append(entry(&format!("e{i}"), "h")).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 64);
    }
}
