use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_PREFETCH_LANGUAGE: &str = "as";

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct MediClearConfig {
    /// Absence is not fatal at startup; every model call reports it instead.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Option<Duration>,
    pub database_url: Option<String>,
    pub port: u16,
    pub history_limit: usize,
    /// Language translated in the background after every analysis.
    pub prefetch_language: Option<String>,
}

impl Default for MediClearConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
            database_url: None,
            port: DEFAULT_PORT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            prefetch_language: Some(DEFAULT_PREFETCH_LANGUAGE.to_string()),
        }
    }
}

impl MediClearConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_key: non_empty("GEMINI_API_KEY"),
            model: non_empty("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: non_empty("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            request_timeout: parse_or_warn::<u64>(
                "GEMINI_TIMEOUT_SECS",
                non_empty("GEMINI_TIMEOUT_SECS"),
            )
            .map(Duration::from_secs),
            database_url: non_empty("DATABASE_URL"),
            port: parse_or_warn("PORT", non_empty("PORT")).unwrap_or(defaults.port),
            history_limit: parse_or_warn("HISTORY_LIMIT", non_empty("HISTORY_LIMIT"))
                .unwrap_or(defaults.history_limit),
            prefetch_language: match lookup("PREFETCH_LANGUAGE") {
                Some(lang) if lang.trim().is_empty() => None,
                Some(lang) => Some(lang.trim().to_string()),
                None => defaults.prefetch_language,
            },
        }
    }

    pub fn api_key_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> MediClearConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MediClearConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert!(!config.api_key_configured());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.port, 3001);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.prefetch_language.as_deref(), Some("as"));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_BASE_URL", "http://localhost:8080/"),
            ("GEMINI_TIMEOUT_SECS", "30"),
            ("PORT", "8000"),
            ("HISTORY_LIMIT", "50"),
            ("PREFETCH_LANGUAGE", ""),
        ]);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.port, 8000);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.prefetch_language, None);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("GEMINI_API_KEY", "  ")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.api_key.is_none());
    }
}
