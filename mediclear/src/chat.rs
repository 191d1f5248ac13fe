use std::sync::Arc;
use tracing::{info, warn};

use crate::error::MediClearError;
use crate::gemini::{GenerativeModel, Part};
use crate::prompts;

/// Reply used when no API key is configured.
pub const OFFLINE_REPLY: &str = "That's a great question. I'd recommend discussing this with your doctor who knows your full health history.";

/// Reply used when the model call fails for any other reason.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process that. Please try again.";

/// Answers follow-up questions grounded in one report.
///
/// Calls are independent: only the latest question and the report context are
/// sent, never the earlier conversation.
#[derive(Clone)]
pub struct ChatAssistant {
    model: Arc<dyn GenerativeModel>,
}

impl ChatAssistant {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Never fails; errors are logged and replaced with a fixed reply.
    pub async fn answer(&self, question: &str, report_context: &str) -> String {
        let preview: String = question.chars().take(80).collect();
        info!("Chat question: {:?}", preview);

        let prompt = prompts::chat_prompt(report_context, question);
        match self.model.generate(&[Part::text(prompt)]).await {
            Ok(reply) => reply.trim().to_string(),
            Err(MediClearError::MissingApiKey) => {
                warn!("Chat requested without an API key, using offline reply");
                OFFLINE_REPLY.to_string()
            }
            Err(e) => {
                warn!("Chat request failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
