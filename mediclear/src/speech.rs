use serde::{Deserialize, Serialize};
use tracing::info;

pub const SPEECH_RATE: f32 = 0.85;
pub const SPEECH_PITCH: f32 = 1.0;
pub const DEFAULT_VOICE_LANGUAGE: &str = "en-US";

/// Assamese voices are rare; Bengali reads the same script, Hindi is the last resort.
const ASSAMESE_CANDIDATES: [(&str, &str); 3] = [("as", "as-IN"), ("bn", "bn-IN"), ("hi", "hi-IN")];

/// What a text-to-speech engine should be asked to say, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechPlan {
    pub text: String,
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
}

impl SpeechPlan {
    fn new(text: &str, language: &str) -> Self {
        Self {
            text: text.to_string(),
            language: language.to_string(),
            rate: SPEECH_RATE,
            pitch: SPEECH_PITCH,
        }
    }

    /// The plan to retry with when the preferred voice fails. `None` when this
    /// plan already uses the default voice.
    pub fn fallback(&self) -> Option<SpeechPlan> {
        (self.language != DEFAULT_VOICE_LANGUAGE)
            .then(|| SpeechPlan::new(&self.text, DEFAULT_VOICE_LANGUAGE))
    }
}

/// Picks a voice for `language`.
///
/// `available_voices` holds the voice language tags the engine reports (e.g. `bn-IN`).
/// When the engine cannot list them, pass `None` and the preferred voice is used as is.
pub fn plan_speech(text: &str, language: &str, available_voices: Option<&[String]>) -> SpeechPlan {
    let voice = match language {
        "as" => match available_voices {
            None => "as-IN",
            Some(voices) => ASSAMESE_CANDIDATES
                .iter()
                .find(|(prefix, _)| voices.iter().any(|v| v.starts_with(prefix)))
                .map(|(_, voice)| *voice)
                .unwrap_or(DEFAULT_VOICE_LANGUAGE),
        },
        _ => DEFAULT_VOICE_LANGUAGE,
    };

    if language == "as" && voice != "as-IN" {
        info!("No Assamese voice available, speaking with {}", voice);
    }
    SpeechPlan::new(text, voice)
}
