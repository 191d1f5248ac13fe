use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::models::{AnalysisResult, ChatMessage};
use crate::prompts::SOURCE_LANGUAGE;

/// The result currently shown, tagged with the analysis generation it belongs to.
#[derive(Debug, Clone)]
pub struct ActiveAnalysis {
    pub generation: u64,
    pub result: Arc<AnalysisResult>,
}

/// Per-user state of one analysis session: the active result, the language it is
/// displayed in, the translation cache and the chat log.
///
/// Translation cache entries are only accepted for the generation they were
/// derived from, so a translation finishing after a newer analysis started is dropped.
#[derive(Debug)]
pub struct AnalysisSession {
    id: String,
    next_generation: AtomicU64,
    active: RwLock<Option<ActiveAnalysis>>,
    language: RwLock<String>,
    translations: DashMap<String, Arc<AnalysisResult>>,
    chat_log: RwLock<Vec<ChatMessage>>,
    translation_lock: Mutex<()>,
}

impl AnalysisSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            next_generation: AtomicU64::new(0),
            active: RwLock::new(None),
            language: RwLock::new(SOURCE_LANGUAGE.to_string()),
            translations: DashMap::new(),
            chat_log: RwLock::new(Vec::new()),
            translation_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Makes `result` the active analysis and resets everything derived from the
    /// previous one. Returns the new generation.
    pub async fn begin_analysis(&self, result: AnalysisResult) -> ActiveAnalysis {
        let mut active = self.active.write().await;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = ActiveAnalysis {
            generation,
            result: Arc::new(result),
        };

        self.translations.clear();
        *self.language.write().await = SOURCE_LANGUAGE.to_string();
        self.chat_log.write().await.clear();
        *active = Some(current.clone());

        current
    }

    pub async fn clear(&self) {
        let mut active = self.active.write().await;
        self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.translations.clear();
        *self.language.write().await = SOURCE_LANGUAGE.to_string();
        self.chat_log.write().await.clear();
        *active = None;
    }

    pub async fn active(&self) -> Option<ActiveAnalysis> {
        self.active.read().await.clone()
    }

    pub async fn active_result(&self) -> Option<Arc<AnalysisResult>> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.result.clone())
    }

    /// The active result serialized for chat grounding.
    pub async fn report_context(&self) -> Option<String> {
        let result = self.active_result().await?;
        serde_json::to_string(result.as_ref()).ok()
    }

    pub async fn language(&self) -> String {
        self.language.read().await.clone()
    }

    pub async fn set_language(&self, language: impl Into<String>) {
        *self.language.write().await = language.into();
    }

    /// Sets the display language only while `generation` is still active.
    pub async fn set_language_for(&self, generation: u64, language: impl Into<String>) -> bool {
        let active = self.active.read().await;
        match active.as_ref() {
            Some(current) if current.generation == generation => {
                *self.language.write().await = language.into();
                true
            }
            _ => false,
        }
    }

    /// What the user sees: the translation for the current language when cached,
    /// otherwise the original.
    pub async fn display(&self) -> Option<Arc<AnalysisResult>> {
        let original = self.active_result().await?;
        let language = self.language().await;
        if language == SOURCE_LANGUAGE {
            return Some(original);
        }
        Some(self.cached_translation(&language).unwrap_or(original))
    }

    pub fn cached_translation(&self, language: &str) -> Option<Arc<AnalysisResult>> {
        self.translations
            .get(language)
            .map(|entry| entry.value().clone())
    }

    pub fn cached_languages(&self) -> Vec<String> {
        self.translations
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stores a translation if `generation` is still the active one.
    pub async fn cache_translation(
        &self,
        generation: u64,
        language: impl Into<String>,
        translated: Arc<AnalysisResult>,
    ) -> bool {
        let active = self.active.read().await;
        match active.as_ref() {
            Some(current) if current.generation == generation => {
                self.translations.insert(language.into(), translated);
                true
            }
            _ => false,
        }
    }

    /// Serializes translation misses so the same language is never requested twice.
    pub async fn lock_translations(&self) -> MutexGuard<'_, ()> {
        self.translation_lock.lock().await
    }

    pub async fn push_message(&self, message: ChatMessage) {
        self.chat_log.write().await.push(message);
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.chat_log.read().await.clone()
    }

    pub async fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            language: self.language().await,
            result: self.display().await.map(|r| r.as_ref().clone()),
            cached_languages: self.cached_languages(),
            messages: self.messages().await,
        }
    }
}

/// Serializable snapshot of a session for clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub language: String,
    pub result: Option<AnalysisResult>,
    pub cached_languages: Vec<String>,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_analysis;

    #[tokio::test]
    async fn test_new_analysis_resets_derived_state() {
        let session = AnalysisSession::new("s1");
        let first = session.begin_analysis(sample_analysis()).await;

        session
            .cache_translation(first.generation, "as", Arc::new(sample_analysis()))
            .await;
        session.set_language("as").await;
        session.push_message(ChatMessage::user("hi")).await;

        let second = session.begin_analysis(sample_analysis()).await;

        assert!(second.generation > first.generation);
        assert!(session.cached_translation("as").is_none());
        assert_eq!(session.language().await, "en");
        assert!(session.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_translation_is_dropped() {
        let session = AnalysisSession::new("s1");
        let first = session.begin_analysis(sample_analysis()).await;
        session.begin_analysis(sample_analysis()).await;

        let stored = session
            .cache_translation(first.generation, "as", Arc::new(sample_analysis()))
            .await;

        assert!(!stored);
        assert!(session.cached_languages().is_empty());
    }

    #[tokio::test]
    async fn test_language_is_not_set_for_superseded_analysis() {
        let session = AnalysisSession::new("s1");
        let first = session.begin_analysis(sample_analysis()).await;
        let second = session.begin_analysis(sample_analysis()).await;

        assert!(!session.set_language_for(first.generation, "as").await);
        assert_eq!(session.language().await, "en");

        assert!(session.set_language_for(second.generation, "as").await);
        assert_eq!(session.language().await, "as");
    }

    #[tokio::test]
    async fn test_display_follows_language() {
        let session = AnalysisSession::new("s1");
        assert!(session.display().await.is_none());

        let active = session.begin_analysis(sample_analysis()).await;
        let mut translated = sample_analysis();
        translated.summary = "অনুবাদ".to_string();
        session
            .cache_translation(active.generation, "as", Arc::new(translated))
            .await;

        session.set_language("as").await;
        assert_eq!(session.display().await.unwrap().summary, "অনুবাদ");

        session.set_language("en").await;
        let shown = session.display().await.unwrap();
        assert!(Arc::ptr_eq(&shown, &active.result));
    }

    #[tokio::test]
    async fn test_clear_drops_active_result() {
        let session = AnalysisSession::new("s1");
        session.begin_analysis(sample_analysis()).await;
        assert!(session.report_context().await.is_some());

        session.clear().await;

        assert!(session.active().await.is_none());
        assert!(session.report_context().await.is_none());
        let view = session.view().await;
        assert_eq!(view.session_id, "s1");
        assert!(view.result.is_none());
    }
}
