use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Structured plain-language interpretation of one uploaded medical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub document_type: DocumentType,
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub health_story: String,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub doctor_questions: Vec<String>,
    #[serde(default)]
    pub glossary: Vec<GlossaryEntry>,
    #[serde(default)]
    pub pii_found: Vec<String>,
}

impl AnalysisResult {
    pub fn abnormal_metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics
            .iter()
            .filter(|m| m.status != MetricStatus::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LabReport,
    DischargeSummary,
    Prescription,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::LabReport => "lab_report",
            DocumentType::DischargeSummary => "discharge_summary",
            DocumentType::Prescription => "prescription",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Routine,
    AttentionNeeded,
    Urgent,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Routine => "routine",
            UrgencyLevel::AttentionNeeded => "attention_needed",
            UrgencyLevel::Urgent => "urgent",
        }
    }
}

/// One lab value with its classification and patient-facing explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub normal_range: String,
    pub status: MetricStatus,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Normal,
    SlightlyHigh,
    SlightlyLow,
    High,
    Low,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
}

/// Models sometimes answer `"value": 13.5` instead of `"13.5"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Persisted form of an analysis, owned by one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl AnalysisRecord {
    pub fn new(owner_id: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
            result,
        }
    }

    pub fn to_history_item(&self) -> HistoryItem {
        HistoryItem {
            id: self.id.clone(),
            created_at: self.created_at,
            document_type: self.result.document_type,
            urgency_level: self.result.urgency_level,
            summary: self.result.summary.clone(),
            metrics_count: self.result.metrics.len(),
        }
    }
}

/// List projection of a stored analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub document_type: DocumentType,
    pub urgency_level: UrgencyLevel,
    pub summary: String,
    pub metrics_count: usize,
}
