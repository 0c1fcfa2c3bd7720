use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2";

/// Which provider the user wants the pipeline to prefer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreference {
    /// Use the local model when it is available, otherwise the hosted one
    #[default]
    Automatic,
    /// Always use the hosted model
    ForceHosted,
}

/// Complete library configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub llm: LLMConfig,
    pub local_model: LocalModelConfig,
    pub logging: LoggingConfig,
}

/// Hosted model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub preference: ProviderPreference,
    pub app_title: String,
    pub app_url: String,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub timeout_secs: u64,
    pub rng_seed: Option<u64>,
}

/// Local (on-machine) model configuration; absent URL means no local model
#[derive(Debug, Clone, Deserialize)]
pub struct LocalModelConfig {
    pub url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            preference: ProviderPreference::Automatic,
            app_title: "Study Generation".to_string(),
            app_url: "https://localhost".to_string(),
            pacing_min_ms: 500,
            pacing_max_ms: 1000,
            timeout_secs: 60,
            rng_seed: None,
        }
    }
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: DEFAULT_LOCAL_MODEL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,study_generation=debug".to_string(),
            file_enabled: false,
            console_enabled: true,
            log_directory: "logs".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env`) with sensible defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        log_system_event!(config, "Loading generation configuration from environment variables");

        let config = Config {
            llm: LLMConfig::from_env()?,
            local_model: LocalModelConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            api_key_masked = %self.llm.api_key.as_deref().map(mask_sensitive_data).unwrap_or_else(|| "<unset>".to_string()),
            llm_model = %self.llm.model,
            llm_base_url = %self.llm.base_url,
            preference = ?self.llm.preference,
            local_model_url = ?self.local_model.url,
            pacing_ms = %format!("{}-{}", self.llm.pacing_min_ms, self.llm.pacing_max_ms),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.check_bounds() {
            log_validation!(failure, "configuration", error = e);
            return Err(e);
        }

        // A missing key is legal: it surfaces per call as a configuration error
        match self.llm.api_key.as_deref() {
            None => warn!("LLM API key is not set - hosted generation will report a missing credential"),
            Some("your-api-key") => warn!("LLM API key appears to be a placeholder"),
            Some(_) => {}
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }

    fn check_bounds(&self) -> Result<()> {
        if self.llm.pacing_min_ms > self.llm.pacing_max_ms {
            return Err(anyhow!(
                "LLM_PACING_MIN_MS ({}) must not exceed LLM_PACING_MAX_MS ({})",
                self.llm.pacing_min_ms,
                self.llm.pacing_max_ms
            ));
        }

        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(anyhow!("LLM_BASE_URL must start with 'http://' or 'https://'"));
        }

        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("LLM_TIMEOUT_SECS must be greater than 0"));
        }

        if self.local_model.timeout_secs == 0 {
            return Err(anyhow!("LOCAL_MODEL_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let defaults = LLMConfig::default();

        let api_key = env::var("LLM_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let base_url = env::var("LLM_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let model = env::var("LLM_MODEL").unwrap_or(defaults.model);

        let preference_str = env::var("LLM_PROVIDER_PREFERENCE")
            .unwrap_or_else(|_| "automatic".to_string());

        let preference = match preference_str.to_lowercase().as_str() {
            "hosted" | "remote" | "forcehosted" | "force_hosted" => ProviderPreference::ForceHosted,
            "automatic" | "auto" | "local" => ProviderPreference::Automatic,
            _ => {
                info!("Unknown provider preference '{}', defaulting to automatic", preference_str);
                ProviderPreference::Automatic
            }
        };

        let app_title = env::var("LLM_APP_TITLE").unwrap_or(defaults.app_title);
        let app_url = env::var("LLM_APP_URL").unwrap_or(defaults.app_url);

        let pacing_min_ms = parse_env_number("LLM_PACING_MIN_MS", defaults.pacing_min_ms)?;
        let pacing_max_ms = parse_env_number("LLM_PACING_MAX_MS", defaults.pacing_max_ms)?;
        let timeout_secs = parse_env_number("LLM_TIMEOUT_SECS", defaults.timeout_secs)?;

        let rng_seed = match env::var("LLM_RNG_SEED") {
            Ok(value) => Some(
                value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("Invalid LLM_RNG_SEED value: '{}'", value))?,
            ),
            Err(_) => None,
        };

        Ok(LLMConfig {
            api_key,
            base_url,
            model,
            preference,
            app_title,
            app_url,
            pacing_min_ms,
            pacing_max_ms,
            timeout_secs,
            rng_seed,
        })
    }
}

impl LocalModelConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("LOCAL_MODEL_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let model = env::var("LOCAL_MODEL_NAME")
            .unwrap_or_else(|_| DEFAULT_LOCAL_MODEL.to_string());

        let timeout_secs = parse_env_number("LOCAL_MODEL_TIMEOUT_SECS", LocalModelConfig::default().timeout_secs)?;

        Ok(LocalModelConfig {
            url,
            model,
            timeout_secs,
        })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,study_generation=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY")
            .unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

fn parse_env_number(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a non-negative integer", name, value)),
        Err(_) => Ok(default),
    }
}

/// Source of user preferences and hosted credentials.
///
/// The application owns these values; the pipeline only reads them, once per call.
pub trait SettingsStore: Send + Sync {
    fn preference(&self) -> ProviderPreference;
    fn hosted_api_key(&self) -> Option<String>;
    fn hosted_model_name(&self) -> String;
    fn is_local_model_available(&self) -> bool;
}

/// Settings fixed at construction time, typically from [`Config`]
#[derive(Debug, Clone)]
pub struct StaticSettings {
    pub preference: ProviderPreference,
    pub api_key: Option<String>,
    pub model: String,
    pub local_model_available: bool,
}

impl StaticSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preference: config.llm.preference,
            api_key: config.llm.api_key.clone(),
            model: config.llm.model.clone(),
            local_model_available: config.local_model.url.is_some(),
        }
    }
}

impl SettingsStore for StaticSettings {
    fn preference(&self) -> ProviderPreference {
        self.preference
    }

    fn hosted_api_key(&self) -> Option<String> {
        self.api_key.clone()
    }

    fn hosted_model_name(&self) -> String {
        self.model.clone()
    }

    fn is_local_model_available(&self) -> bool {
        self.local_model_available
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
