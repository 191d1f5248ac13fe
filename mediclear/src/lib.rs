pub mod analysis;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod history;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod speech;
pub mod storage;
pub mod storage_postgres;
pub mod translation;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use analysis::{DocumentAnalyzer, DocumentPayload};
pub use chat::{ChatAssistant, FALLBACK_REPLY, OFFLINE_REPLY};
pub use config::MediClearConfig;
pub use error::{
    AuthError, ErrorCategory, MediClearError, Result, StoreError, UpstreamError, UpstreamErrorKind,
};
pub use gemini::{GeminiClient, GenerativeModel, Part};
pub use history::History;
pub use identity::{AuthSession, Identity, IdentityProvider, InMemoryIdentityProvider};
pub use models::{
    AnalysisRecord, AnalysisResult, ChatMessage, ChatRole, DocumentType, GlossaryEntry,
    HistoryItem, Metric, MetricStatus, UrgencyLevel,
};
pub use pipeline::{AnalysisOutcome, ReportPipeline, normalize_language};
pub use session::{AnalysisSession, SessionView};
pub use speech::{SpeechPlan, plan_speech};
pub use storage::{AnalysisStore, InMemoryAnalysisStore, InMemorySessionStorage, SessionStorage};
pub use storage_postgres::PostgresAnalysisStore;
pub use translation::Translator;
