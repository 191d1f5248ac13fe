//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{MediClearError, Result};
use crate::gemini::{GenerativeModel, Part};
use crate::models::AnalysisResult;

/// A model that answers from a queue and records every request it receives.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<Part>>>,
    configured: bool,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            configured: true,
            delay: None,
        }
    }

    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    /// Behaves like a client without an API key.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: MediClearError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Number of requests that reached the "network".
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<Part>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .and_then(|parts| match parts.first() {
                Some(Part::Text { text }) => Some(text.clone()),
                _ => None,
            })
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, parts: &[Part]) -> Result<String> {
        if !self.configured {
            return Err(MediClearError::MissingApiKey);
        }
        self.requests.lock().unwrap().push(parts.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(MediClearError::EmptyResponse))
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// A lab report with one normal Hemoglobin metric.
pub fn sample_analysis_json() -> String {
    serde_json::json!({
        "summary": "Your blood test looks healthy.",
        "documentType": "lab_report",
        "urgencyLevel": "routine",
        "metrics": [{
            "name": "Hemoglobin",
            "value": "13.5",
            "unit": "g/dL",
            "normalRange": "12.0-15.5",
            "status": "normal",
            "explanation": "Hemoglobin carries oxygen, like delivery trucks.",
            "category": "blood"
        }],
        "healthStory": "Your blood is doing its job well.",
        "actionItems": ["Keep drinking water"],
        "doctorQuestions": ["Do I need another test next year?"],
        "glossary": [{"term": "Hemoglobin", "definition": "A protein that carries oxygen."}],
        "piiFound": ["Patient Name"]
    })
    .to_string()
}

pub fn sample_analysis() -> AnalysisResult {
    serde_json::from_str(&sample_analysis_json()).unwrap()
}

/// The sample analysis translated to Assamese, codes untouched.
pub fn sample_translation_json() -> String {
    serde_json::json!({
        "summary": "আপোনাৰ তেজ পৰীক্ষা সুস্থ দেখা গৈছে।",
        "documentType": "lab_report",
        "urgencyLevel": "routine",
        "metrics": [{
            "name": "হিম'গ্ল'বিন (Hemoglobin)",
            "value": "১৩.৫",
            "unit": "g/dL",
            "normalRange": "১২.০-১৫.৫",
            "status": "normal",
            "explanation": "হিম'গ্ল'বিনে অক্সিজেন কঢ়িয়াই নিয়ে।",
            "category": "blood"
        }],
        "healthStory": "আপোনাৰ তেজে ভালদৰে কাম কৰি আছে।",
        "actionItems": ["পানী খাই থাকক"],
        "doctorQuestions": ["মোক অহা বছৰ আন এটা পৰীক্ষাৰ প্ৰয়োজন হ'বনে?"],
        "glossary": [{"term": "হিম'গ্ল'বিন", "definition": "অক্সিজেন কঢ়িওৱা প্ৰ'টিন।"}],
        "piiFound": ["ৰোগীৰ নাম"]
    })
    .to_string()
}
