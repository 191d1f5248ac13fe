use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{MediClearError, ResponseKind, Result};
use crate::extract::extract_json_object;
use crate::gemini::{GenerativeModel, Part};
use crate::models::AnalysisResult;
use crate::prompts;

/// Translates the human-readable text of an analysis, keeping its codes intact.
#[derive(Clone)]
pub struct Translator {
    model: Arc<dyn GenerativeModel>,
}

impl Translator {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// One network call, no caching. See `ReportPipeline::translate` for the cached path.
    pub async fn translate(
        &self,
        source: &AnalysisResult,
        language: &str,
    ) -> Result<AnalysisResult> {
        let language_name = prompts::language_display_name(language);
        info!("Translating analysis to {}", language_name);

        let source_json = serde_json::to_string(source).map_err(MediClearError::InvalidAnalysis)?;
        let prompt = prompts::translation_prompt(language_name, &source_json);
        let response_text = self.model.generate(&[Part::text(prompt)]).await?;

        let object =
            extract_json_object(&response_text).map_err(|source| MediClearError::Extraction {
                kind: ResponseKind::Translation,
                source,
            })?;
        let mut translated: Value =
            serde_json::from_str(object).map_err(MediClearError::InvalidAnalysis)?;

        let restored = restore_protected_fields(source, &mut translated)?;
        if restored > 0 {
            warn!(
                "Translation to {} altered {} code field(s); restored from source",
                language, restored
            );
        }

        serde_json::from_value(translated).map_err(MediClearError::InvalidAnalysis)
    }
}

/// Overwrites `documentType`, `urgencyLevel` and every metric `status` in a
/// translated object with the source values. Returns how many of them differed.
///
/// The metrics are matched by position, so a translation that dropped or added
/// metrics is rejected rather than patched.
pub fn restore_protected_fields(source: &AnalysisResult, translated: &mut Value) -> Result<usize> {
    let object = translated.as_object_mut().ok_or_else(|| {
        MediClearError::TranslationMismatch("translation is not a JSON object".to_string())
    })?;

    let mut restored = 0;
    restored += overwrite(
        object,
        "documentType",
        Value::from(source.document_type.as_str()),
    );
    restored += overwrite(
        object,
        "urgencyLevel",
        Value::from(source.urgency_level.as_str()),
    );

    let translated_count = object
        .get("metrics")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if translated_count != source.metrics.len() {
        return Err(MediClearError::TranslationMismatch(format!(
            "metrics count changed from {} to {}",
            source.metrics.len(),
            translated_count
        )));
    }

    if let Some(metrics) = object.get_mut("metrics").and_then(Value::as_array_mut) {
        for (metric, original) in metrics.iter_mut().zip(&source.metrics) {
            let Some(metric) = metric.as_object_mut() else {
                return Err(MediClearError::TranslationMismatch(
                    "metric is not a JSON object".to_string(),
                ));
            };
            let status = serde_json::to_value(original.status)
                .map_err(MediClearError::InvalidAnalysis)?;
            restored += overwrite(metric, "status", status);
        }
    }

    Ok(restored)
}

fn overwrite(object: &mut serde_json::Map<String, Value>, key: &str, expected: Value) -> usize {
    let changed = object.get(key) != Some(&expected);
    object.insert(key.to_string(), expected);
    usize::from(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, MetricStatus, UrgencyLevel};
    use crate::testing::{ScriptedModel, sample_analysis, sample_translation_json};
    use serde_json::json;

    #[tokio::test]
    async fn test_translate_keeps_codes_and_translates_text() {
        let model = Arc::new(ScriptedModel::replying([sample_translation_json()]));
        let translator = Translator::new(model.clone());
        let source = sample_analysis();

        let translated = translator.translate(&source, "as").await.unwrap();

        assert_eq!(translated.document_type, DocumentType::LabReport);
        assert_eq!(translated.metrics[0].status, MetricStatus::Normal);
        assert_ne!(translated.summary, source.summary);
        assert!(model.last_prompt().unwrap().contains("Assamese (অসমীয়া)"));
    }

    #[tokio::test]
    async fn test_translated_codes_are_restored() {
        let mut drifted: Value = serde_json::from_str(&sample_translation_json()).unwrap();
        drifted["urgencyLevel"] = json!("নিয়মীয়া");
        drifted["metrics"][0]["status"] = json!("স্বাভাৱিক");

        let model = Arc::new(ScriptedModel::replying([drifted.to_string()]));
        let translated = Translator::new(model)
            .translate(&sample_analysis(), "as")
            .await
            .unwrap();

        assert_eq!(translated.urgency_level, UrgencyLevel::Routine);
        assert_eq!(translated.metrics[0].status, MetricStatus::Normal);
    }

    #[tokio::test]
    async fn test_missing_metric_is_rejected() {
        let mut shortened: Value = serde_json::from_str(&sample_translation_json()).unwrap();
        shortened["metrics"] = json!([]);

        let model = Arc::new(ScriptedModel::replying([shortened.to_string()]));
        let err = Translator::new(model)
            .translate(&sample_analysis(), "as")
            .await
            .unwrap_err();

        assert!(matches!(err, MediClearError::TranslationMismatch(_)));
    }

    #[tokio::test]
    async fn test_unparseable_translation() {
        let model = Arc::new(ScriptedModel::replying(["অনুবাদ কৰিব নোৱাৰি"]));
        let err = Translator::new(model)
            .translate(&sample_analysis(), "as")
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Translation result was not in the expected format."
        );
    }

    #[test]
    fn test_restore_counts_only_changes() {
        let source = sample_analysis();
        let mut untouched = serde_json::to_value(&source).unwrap();
        assert_eq!(restore_protected_fields(&source, &mut untouched).unwrap(), 0);

        let mut missing_codes = serde_json::to_value(&source).unwrap();
        missing_codes.as_object_mut().unwrap().remove("documentType");
        assert_eq!(
            restore_protected_fields(&source, &mut missing_codes).unwrap(),
            1
        );
        assert_eq!(missing_codes["documentType"], "lab_report");
    }

    #[test]
    fn test_restore_rejects_non_object() {
        let mut value = json!(["not", "an", "object"]);
        assert!(restore_protected_fields(&sample_analysis(), &mut value).is_err());
    }
}
