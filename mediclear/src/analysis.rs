use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{MediClearError, ResponseKind, Result};
use crate::extract::extract_json_object;
use crate::gemini::{GenerativeModel, Part};
use crate::models::AnalysisResult;
use crate::prompts;

/// MIME types the upstream vision model reads.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
    "application/pdf",
];

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A captured or picked file, Base64 encoded, ready to inline in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    base64_data: String,
    mime_type: String,
}

impl DocumentPayload {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(MediClearError::EmptyDocument);
        }
        Self::from_base64(STANDARD.encode(bytes), mime_type)
    }

    /// Accepts data that a client already encoded, with or without a `data:` URL prefix.
    pub fn from_base64(data: impl Into<String>, mime_type: &str) -> Result<Self> {
        let data = data.into();
        let data = match data.split_once("base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest.to_string(),
            _ => data,
        };
        let data: String = data.split_whitespace().collect();
        if data.is_empty() {
            return Err(MediClearError::EmptyDocument);
        }
        if STANDARD.decode(&data)?.is_empty() {
            return Err(MediClearError::EmptyDocument);
        }

        let mime_type = normalize_mime_type(mime_type)?;
        Ok(Self {
            base64_data: data,
            mime_type,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_type_for_path(path).ok_or_else(|| {
            MediClearError::UnsupportedMimeType(path.display().to_string())
        })?;
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(&bytes, mime_type)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64_data(&self) -> &str {
        &self.base64_data
    }

    fn to_part(&self) -> Part {
        Part::inline(self.mime_type.clone(), self.base64_data.clone())
    }
}

fn normalize_mime_type(mime_type: &str) -> Result<String> {
    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let normalized = match normalized.as_str() {
        "" => DEFAULT_MIME_TYPE.to_string(),
        "image/jpg" => "image/jpeg".to_string(),
        _ => normalized,
    };

    if SUPPORTED_MIME_TYPES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(MediClearError::UnsupportedMimeType(mime_type.to_string()))
    }
}

fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Turns one document into an [`AnalysisResult`] with a single model call.
#[derive(Clone)]
pub struct DocumentAnalyzer {
    model: Arc<dyn GenerativeModel>,
}

impl DocumentAnalyzer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, document: &DocumentPayload) -> Result<AnalysisResult> {
        info!(
            "Analyzing document: mime={}, size={} chars",
            document.mime_type(),
            document.base64_data().len()
        );

        let parts = [Part::text(prompts::analysis_prompt()), document.to_part()];
        let response_text = self.model.generate(&parts).await?;

        let result = parse_analysis(&response_text)?;
        info!(
            "Analysis complete: {}, {} metrics",
            result.document_type.as_str(),
            result.metrics.len()
        );
        Ok(result)
    }
}

/// Parses free-text model output into an analysis.
pub fn parse_analysis(response_text: &str) -> Result<AnalysisResult> {
    let object = extract_json_object(response_text).map_err(|source| {
        let preview: String = response_text.chars().take(200).collect();
        warn!("No usable JSON in analysis response: {:?}", preview);
        MediClearError::Extraction {
            kind: ResponseKind::Analysis,
            source,
        }
    })?;

    serde_json::from_str(object).map_err(MediClearError::InvalidAnalysis)
}
