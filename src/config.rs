use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ApiProvider,
    pub api_key: String,
    pub extraction_model: String,
    pub solution_model: String,
    pub debugging_model: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    OpenAi,
    Gemini,
}

impl ApiProvider {
    pub fn label(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "OpenAI",
            ApiProvider::Gemini => "Gemini",
        }
    }

    /// Model used when the per-stage model field is left empty.
    pub fn default_model(self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "gpt-4o",
            ApiProvider::Gemini => "gemini-2.0-flash",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ApiProvider::OpenAi,
            api_key: String::new(),
            extraction_model: String::new(),
            solution_model: String::new(),
            debugging_model: String::new(),
            language: "python".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(app_data: &Path) -> Self {
        let config_path = app_data.join("config.json");
        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Self::default(),
            }
        } else {
            let c = Self::default();
            c.save(app_data);
            c
        };

        // Override with environment variable if set (more secure than hardcoding)
        let env_var = match config.provider {
            ApiProvider::OpenAi => "OPENAI_API_KEY",
            ApiProvider::Gemini => "GEMINI_API_KEY",
        };
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                config.api_key = key;
            }
        }

        config
    }

    pub fn save(&self, app_data: &Path) {
        let config_path = app_data.join("config.json");
        if let Ok(content) = serde_json::to_string_pretty(self) {
            std::fs::write(config_path, content).ok();
        }
    }

    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("snapsolver"))
    }

    /// Per-stage model with the provider default as fallback.
    pub fn model_for(&self, stage_model: &str) -> String {
        if stage_model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            stage_model.to_string()
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Read-only view of the persisted configuration. The core reloads it on
/// demand; writes happen elsewhere (settings UI).
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> AppConfig;
}

impl ConfigSource for parking_lot::Mutex<AppConfig> {
    fn load(&self) -> AppConfig {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_serde_uses_lowercase_tags() {
        let cfg = AppConfig {
            provider: ApiProvider::Gemini,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"gemini\""));

        let parsed: AppConfig = serde_json::from_str(r#"{"provider":"openai"}"#).unwrap();
        assert_eq!(parsed.provider, ApiProvider::OpenAi);
        assert_eq!(parsed.language, "python");
    }

    fn temp_config_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "snapsolver-config-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_config_file_yields_defaults_and_seeds_it() {
        let dir = temp_config_dir("seed");
        let _ = std::fs::remove_file(dir.join("config.json"));

        let cfg = AppConfig::load(&dir);
        assert_eq!(cfg.provider, ApiProvider::OpenAi);
        assert_eq!(cfg.language, "python");
        assert!(cfg.extraction_model.is_empty());
        assert!(dir.join("config.json").exists());
    }

    #[test]
    fn save_load_round_trip_and_env_key_override() {
        let dir = temp_config_dir("roundtrip");
        std::env::remove_var("GEMINI_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");

        let cfg = AppConfig {
            provider: ApiProvider::Gemini,
            api_key: "k-from-file".to_string(),
            solution_model: "gemini-2.5-pro".to_string(),
            language: "rust".to_string(),
            ..Default::default()
        };
        cfg.save(&dir);

        let loaded = AppConfig::load(&dir);
        assert_eq!(loaded.provider, ApiProvider::Gemini);
        assert_eq!(loaded.api_key, "k-from-file");
        assert_eq!(loaded.solution_model, "gemini-2.5-pro");
        assert_eq!(loaded.language, "rust");

        // A key for the inactive provider is ignored.
        std::env::set_var("OPENAI_API_KEY", "k-wrong-provider");
        let loaded = AppConfig::load(&dir);
        assert_eq!(loaded.api_key, "k-from-file");
        std::env::remove_var("OPENAI_API_KEY");

        // The active provider's key wins over the persisted one.
        std::env::set_var("GEMINI_API_KEY", "k-from-env");
        let loaded = AppConfig::load(&dir);
        assert_eq!(loaded.api_key, "k-from-env");
        std::env::remove_var("GEMINI_API_KEY");
    }

    #[test]
    fn empty_stage_model_falls_back_to_provider_default() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.model_for(&cfg.extraction_model), "gpt-4o");

        let cfg = AppConfig {
            provider: ApiProvider::Gemini,
            solution_model: "gemini-2.5-pro".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.model_for(&cfg.extraction_model), "gemini-2.0-flash");
        assert_eq!(cfg.model_for(&cfg.solution_model), "gemini-2.5-pro");
    }
}
