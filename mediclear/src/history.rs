use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{AnalysisRecord, AnalysisResult, HistoryItem};
use crate::storage::{AnalysisStore, StoreResult};

/// Per-owner view over an [`AnalysisStore`].
#[derive(Clone)]
pub struct History {
    store: Arc<dyn AnalysisStore>,
}

impl History {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, owner_id: &str, result: AnalysisResult) -> StoreResult<AnalysisRecord> {
        let record = AnalysisRecord::new(owner_id, result);
        self.store.insert(record.clone()).await?;
        info!(owner_id, record_id = %record.id, "Analysis saved to history");
        Ok(record)
    }

    /// Newest first, at most `limit` items.
    ///
    /// Uses the store's ordered query when it works; otherwise lists everything the
    /// owner has and sorts locally, so callers see the same shape either way.
    pub async fn recent(&self, owner_id: &str, limit: usize) -> StoreResult<Vec<HistoryItem>> {
        let records = match self.store.recent_by_owner(owner_id, limit).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Ordered history query failed, sorting locally: {}", e);
                let mut records = self.store.all_by_owner(owner_id).await?;
                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                records.truncate(limit);
                records
            }
        };

        debug!(owner_id, count = records.len(), "History loaded");
        Ok(records.iter().map(AnalysisRecord::to_history_item).collect())
    }

    /// Records owned by someone else are reported as missing.
    pub async fn get(&self, owner_id: &str, id: &str) -> StoreResult<AnalysisRecord> {
        match self.store.get(id).await? {
            Some(record) if record.owner_id == owner_id => Ok(record),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> StoreResult<()> {
        self.get(owner_id, id).await?;
        if !self.store.delete(id).await? {
            return Err(StoreError::NotFound(id.to_string()));
        }
        info!(owner_id, record_id = id, "Analysis deleted from history");
        Ok(())
    }

    pub async fn count(&self, owner_id: &str) -> StoreResult<usize> {
        self.store.count_by_owner(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use crate::storage::InMemoryAnalysisStore;
    use crate::testing::sample_analysis;
    use chrono::{Duration, Utc};

    async fn seed(store: &InMemoryAnalysisStore, owner: &str, ages: &[i64]) -> Vec<AnalysisRecord> {
        let mut records = Vec::new();
        for minutes in ages {
            let mut record = AnalysisRecord::new(owner, sample_analysis());
            record.created_at = Utc::now() - Duration::minutes(*minutes);
            store.insert(record.clone()).await.unwrap();
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_both_paths_return_same_listing() {
        let indexed = Arc::new(InMemoryAnalysisStore::new());
        let records = seed(&indexed, "alice", &[5, 1, 30, 10]).await;

        let unindexed = Arc::new(InMemoryAnalysisStore::without_ordered_index());
        for record in &records {
            unindexed.insert(record.clone()).await.unwrap();
        }

        let fast = History::new(indexed).recent("alice", 3).await.unwrap();
        let slow = History::new(unindexed).recent("alice", 3).await.unwrap();

        assert_eq!(fast, slow);
        assert_eq!(fast.len(), 3);
        assert!(fast.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(fast[0].id, records[1].id);
    }

    #[tokio::test]
    async fn test_history_item_projection() {
        let history = History::new(Arc::new(InMemoryAnalysisStore::new()));
        let saved = history.save("alice", sample_analysis()).await.unwrap();

        let items = history.recent("alice", 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, saved.id);
        assert_eq!(items[0].document_type, DocumentType::LabReport);
        assert_eq!(items[0].metrics_count, 1);
        assert_eq!(history.count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_foreign_records_are_not_found() {
        let history = History::new(Arc::new(InMemoryAnalysisStore::new()));
        let saved = history.save("alice", sample_analysis()).await.unwrap();

        assert!(matches!(
            history.get("bob", &saved.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            history.delete("bob", &saved.id).await,
            Err(StoreError::NotFound(_))
        ));

        history.delete("alice", &saved.id).await.unwrap();
        assert_eq!(history.count("alice").await.unwrap(), 0);
    }
}
