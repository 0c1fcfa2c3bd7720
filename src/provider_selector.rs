use serde::{Deserialize, Serialize};

use crate::config::ProviderPreference;

pub const LOCAL_UNAVAILABLE_NOTICE: &str =
    "On-device model is unavailable on this device; using the hosted model instead.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Hosted,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Hosted => "hosted",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider picked for one call, with the reason if it is not the preferred one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChoice {
    pub provider: ProviderKind,
    pub fallback_notice: Option<String>,
}

impl ProviderChoice {
    pub fn hosted() -> Self {
        Self {
            provider: ProviderKind::Hosted,
            fallback_notice: None,
        }
    }

    pub fn local() -> Self {
        Self {
            provider: ProviderKind::Local,
            fallback_notice: None,
        }
    }

    pub fn degraded(notice: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Hosted,
            fallback_notice: Some(notice.into()),
        }
    }
}

pub fn select_provider(preference: ProviderPreference, local_available: bool) -> ProviderChoice {
    match preference {
        ProviderPreference::ForceHosted => ProviderChoice::hosted(),
        ProviderPreference::Automatic if local_available => ProviderChoice::local(),
        ProviderPreference::Automatic => ProviderChoice::degraded(LOCAL_UNAVAILABLE_NOTICE),
    }
}
