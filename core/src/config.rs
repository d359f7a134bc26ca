use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::judge::AmbiguityPolicy;
use crate::matcher::MatchOptions;
use crate::retry::ControllerSettings;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: pantry_dir().join("recipes.db"),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions URL.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key. The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    pub sql_temperature: f32,
    pub narration_temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            sql_temperature: 0.0,
            narration_temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    pub min_match_threshold: f64,
    pub max_results: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let defaults = MatchOptions::default();
        Self {
            min_match_threshold: defaults.min_match_threshold,
            max_results: defaults.max_results,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JudgeConfig {
    pub ambiguous_columns: AmbiguityPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NarratorConfig {
    pub max_rows: usize,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self { max_rows: 50 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    /// TOML registry file; the built-in recipe schema is used when unset.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub matcher: MatcherConfig,
    pub judge: JudgeConfig,
    pub narrator: NarratorConfig,
    pub schema: SchemaConfig,
}

/// `~/.pantry`, or `./.pantry` when no home directory can be determined.
pub fn pantry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pantry")
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `~/.pantry/pantry.toml` if it exists, else
    /// defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = pantry_dir().join("pantry.toml");
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let mut config = match &path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `PANTRY_DB_PATH`, `PANTRY_LLM_MODEL`, `PANTRY_LLM_ENDPOINT`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PANTRY_DB_PATH").filter(|v| !v.is_empty()) {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PANTRY_LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = v;
        }
        if let Some(v) = lookup("PANTRY_LLM_ENDPOINT").filter(|v| !v.is_empty()) {
            self.llm.endpoint = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matcher.min_match_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(invalid(
                "matcher.min_match_threshold",
                format!("{threshold} is outside 0-100"),
            ));
        }
        if self.matcher.max_results == 0 {
            return Err(invalid("matcher.max_results", "must be at least 1"));
        }
        if self.narrator.max_rows == 0 {
            return Err(invalid("narrator.max_rows", "must be at least 1"));
        }
        for (key, t) in [
            ("llm.sql_temperature", self.llm.sql_temperature),
            ("llm.narration_temperature", self.llm.narration_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid(key, format!("{t} is outside 0-2")));
            }
        }
        Ok(())
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            min_match_threshold: self.matcher.min_match_threshold,
            max_results: self.matcher.max_results,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            sql_temperature: self.llm.sql_temperature,
            narration_temperature: self.llm.narration_temperature,
            narrator_max_rows: self.narrator.max_rows,
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}
