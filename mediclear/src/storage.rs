use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, StoreError};
use crate::models::AnalysisRecord;
use crate::session::AnalysisSession;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remote collection of analysis records, addressable by id and queryable by owner.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn insert(&self, record: AnalysisRecord) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<AnalysisRecord>>;
    /// Server-ordered query: newest first, at most `limit`. May fail when the
    /// backend has no index for it yet.
    async fn recent_by_owner(&self, owner_id: &str, limit: usize)
    -> StoreResult<Vec<AnalysisRecord>>;
    /// Every record of `owner_id`, in no particular order.
    async fn all_by_owner(&self, owner_id: &str) -> StoreResult<Vec<AnalysisRecord>>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;
    async fn count_by_owner(&self, owner_id: &str) -> StoreResult<usize>;
}

/// In-memory implementation of AnalysisStore
pub struct InMemoryAnalysisStore {
    records: Arc<DashMap<String, AnalysisRecord>>,
    ordered_queries: AtomicBool,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            ordered_queries: AtomicBool::new(true),
        }
    }

    /// Simulates a backend whose owner/created_at index is still being built.
    pub fn without_ordered_index() -> Self {
        let store = Self::new();
        store.ordered_queries.store(false, Ordering::SeqCst);
        store
    }

    pub fn set_ordered_index(&self, available: bool) {
        self.ordered_queries.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryAnalysisStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn insert(&self, record: AnalysisRecord) -> StoreResult<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<AnalysisRecord>> {
        Ok(self.records.get(id).map(|entry| entry.clone()))
    }

    async fn recent_by_owner(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisRecord>> {
        if !self.ordered_queries.load(Ordering::SeqCst) {
            return Err(StoreError::IndexUnavailable(
                "analyses(owner_id, created_at desc)".to_string(),
            ));
        }
        let mut records = self.all_by_owner(owner_id).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn all_by_owner(&self, owner_id: &str) -> StoreResult<Vec<AnalysisRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn count_by_owner(&self, owner_id: &str) -> StoreResult<usize> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .count())
    }
}

/// Trait for storing and retrieving analysis sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Arc<AnalysisSession>) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Arc<AnalysisSession>>>;
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns the session for `id`, creating an empty one on first use.
    async fn get_or_create(&self, id: &str) -> Result<Arc<AnalysisSession>> {
        if let Some(session) = self.get(id).await? {
            return Ok(session);
        }
        let session = Arc::new(AnalysisSession::new(id));
        self.save(session.clone()).await?;
        Ok(session)
    }
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Arc<AnalysisSession>>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Arc<AnalysisSession>) -> Result<()> {
        self.sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Arc<AnalysisSession>>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn get_or_create(&self, id: &str) -> Result<Arc<AnalysisSession>> {
        Ok(self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AnalysisSession::new(id)))
            .clone())
    }
}
