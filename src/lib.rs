pub mod config;
pub mod errors;
pub mod fallback;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod provider_selector;
pub mod record_repair;
pub mod tagged_parser;

pub use config::{Config, ProviderPreference, SettingsStore, StaticSettings};
pub use errors::*;
pub use fallback::NoticeSlot;
pub use llm_providers::{LocalModelProvider, LocalSession, OllamaLocalModel, UnavailableLocalModel};
pub use llm_service::GenerationService;
pub use models::*;
pub use provider_selector::{select_provider, ProviderChoice, ProviderKind};
