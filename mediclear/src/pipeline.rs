use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::{DocumentAnalyzer, DocumentPayload};
use crate::chat::ChatAssistant;
use crate::config::MediClearConfig;
use crate::error::{MediClearError, Result};
use crate::gemini::{GeminiClient, GenerativeModel};
use crate::history::History;
use crate::identity::Identity;
use crate::models::{AnalysisResult, ChatMessage};
use crate::prompts::SOURCE_LANGUAGE;
use crate::session::{ActiveAnalysis, AnalysisSession};
use crate::storage::AnalysisStore;
use crate::translation::Translator;

/// A finished analysis plus the background work it started.
///
/// Dropping the handles detaches the tasks; awaiting them waits for the
/// history write and the translation pre-fetch to settle.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: Arc<AnalysisResult>,
    pub persistence: Option<JoinHandle<()>>,
    pub prefetch: Option<JoinHandle<()>>,
}

/// Upload to analysis to translation and chat, for one model and one store.
#[derive(Clone)]
pub struct ReportPipeline {
    model: Arc<dyn GenerativeModel>,
    analyzer: DocumentAnalyzer,
    translator: Translator,
    chat: ChatAssistant,
    history: History,
    prefetch_language: Option<String>,
}

impl ReportPipeline {
    pub fn new(model: Arc<dyn GenerativeModel>, store: Arc<dyn AnalysisStore>) -> Self {
        Self {
            analyzer: DocumentAnalyzer::new(model.clone()),
            translator: Translator::new(model.clone()),
            chat: ChatAssistant::new(model.clone()),
            history: History::new(store),
            prefetch_language: None,
            model,
        }
    }

    pub fn from_config(config: &MediClearConfig, store: Arc<dyn AnalysisStore>) -> Result<Self> {
        let client = GeminiClient::from_config(config)?;
        Ok(Self::new(Arc::new(client), store)
            .with_prefetch_language(config.prefetch_language.clone()))
    }

    /// Language translated in the background after every analysis. `None` or the
    /// source language disables the pre-fetch.
    pub fn with_prefetch_language(mut self, language: Option<String>) -> Self {
        self.prefetch_language = language
            .and_then(|l| normalize_language(&l).ok())
            .filter(|l| l != SOURCE_LANGUAGE);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_configured()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Analyzes `document` and makes the result the session's active analysis.
    ///
    /// On failure the session is left untouched. On success the result is saved
    /// for `owner` and pre-translated in the background; neither can fail this call.
    pub async fn analyze(
        &self,
        session: &Arc<AnalysisSession>,
        owner: Option<&Identity>,
        document: &DocumentPayload,
    ) -> Result<AnalysisOutcome> {
        let result = self.analyzer.analyze(document).await?;
        let active = session.begin_analysis(result).await;
        info!(
            session_id = session.id(),
            generation = active.generation,
            "Analysis is now active"
        );

        let persistence = match owner {
            Some(identity) => Some(self.spawn_persistence(&identity.user_id, &active.result)),
            None => {
                warn!("No signed-in user, analysis not saved to history");
                None
            }
        };
        let prefetch = self
            .prefetch_language
            .as_ref()
            .map(|language| self.spawn_prefetch(session, &active, language));

        Ok(AnalysisOutcome {
            result: active.result,
            persistence,
            prefetch,
        })
    }

    fn spawn_persistence(&self, owner_id: &str, result: &Arc<AnalysisResult>) -> JoinHandle<()> {
        let history = self.history.clone();
        let owner_id = owner_id.to_string();
        let result = result.as_ref().clone();
        tokio::spawn(async move {
            if let Err(e) = history.save(&owner_id, result).await {
                error!("Failed to save analysis to history: {}", e);
            }
        })
    }

    fn spawn_prefetch(
        &self,
        session: &Arc<AnalysisSession>,
        active: &ActiveAnalysis,
        language: &str,
    ) -> JoinHandle<()> {
        let translator = self.translator.clone();
        let session = session.clone();
        let active = active.clone();
        let language = language.to_string();
        tokio::spawn(async move {
            match translate_cached(&translator, &session, &active, &language).await {
                Ok(_) => debug!("Pre-fetched {} translation", language),
                Err(e) => warn!("Background translation to {} failed: {}", language, e),
            }
        })
    }

    /// The active analysis in `language`, translated at most once per analysis.
    /// Does not change what the session displays.
    pub async fn translate(
        &self,
        session: &AnalysisSession,
        language: &str,
    ) -> Result<Arc<AnalysisResult>> {
        let language = normalize_language(language)?;
        let active = session.active().await.ok_or(MediClearError::NoActiveAnalysis)?;
        translate_cached(&self.translator, session, &active, &language).await
    }

    /// Switches the displayed language. The previous language stays selected
    /// when the translation fails or a newer analysis replaced the one translated.
    pub async fn select_language(
        &self,
        session: &AnalysisSession,
        language: &str,
    ) -> Result<Arc<AnalysisResult>> {
        let language = normalize_language(language)?;
        let active = session.active().await.ok_or(MediClearError::NoActiveAnalysis)?;
        let translated = translate_cached(&self.translator, session, &active, &language).await?;

        if !session.set_language_for(active.generation, &language).await {
            warn!(
                session_id = session.id(),
                "Analysis changed during translation to {}, language not switched", language
            );
            return Err(MediClearError::AnalysisSuperseded);
        }
        info!(session_id = session.id(), "Display language set to {}", language);
        Ok(translated)
    }

    /// Asks a follow-up question about the active analysis. Model failures turn
    /// into a fixed assistant reply rather than an error.
    pub async fn ask(&self, session: &AnalysisSession, question: &str) -> Result<ChatMessage> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MediClearError::EmptyQuestion);
        }
        let context = session
            .report_context()
            .await
            .ok_or(MediClearError::NoActiveAnalysis)?;

        session.push_message(ChatMessage::user(question)).await;
        let reply = ChatMessage::assistant(self.chat.answer(question, &context).await);
        session.push_message(reply.clone()).await;
        Ok(reply)
    }

    /// Makes a saved analysis the active one. The record is not saved again.
    pub async fn open_saved(
        &self,
        session: &AnalysisSession,
        owner: &Identity,
        id: &str,
    ) -> Result<Arc<AnalysisResult>> {
        let record = self.history.get(&owner.user_id, id).await?;
        let active = session.begin_analysis(record.result).await;
        info!(session_id = session.id(), record_id = id, "Opened saved analysis");
        Ok(active.result)
    }
}

/// Trimmed, lowercased language code. Blank codes are rejected.
pub fn normalize_language(language: &str) -> Result<String> {
    let language = language.trim().to_lowercase();
    if language.is_empty() {
        return Err(MediClearError::EmptyLanguage);
    }
    Ok(language)
}

/// `language` must already be normalized.
async fn translate_cached(
    translator: &Translator,
    session: &AnalysisSession,
    active: &ActiveAnalysis,
    language: &str,
) -> Result<Arc<AnalysisResult>> {
    if language == SOURCE_LANGUAGE {
        return Ok(active.result.clone());
    }
    if let Some(cached) = session.cached_translation(language) {
        return Ok(cached);
    }

    let _guard = session.lock_translations().await;
    if let Some(cached) = session.cached_translation(language) {
        return Ok(cached);
    }

    let translated = Arc::new(translator.translate(&active.result, language).await?);
    if !session
        .cache_translation(active.generation, language, translated.clone())
        .await
    {
        debug!("Discarding {} translation of a superseded analysis", language);
    }
    Ok(translated)
}
