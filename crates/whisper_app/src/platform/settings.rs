use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use whisper_core::TriggerSettings;
use whisper_engine::AnalysisSettings;
use whisper_logging::{agent_info, agent_warn};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// Runtime configuration, stored as RON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Mutation bursts within this window form one batch.
    pub debounce_ms: u64,
    /// Anchor re-check interval while a suggestion is visible.
    pub frame_interval_ms: u64,
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    /// Per attempt; `trigger.request_timeout_ms` bounds the whole request.
    pub http_timeout_ms: u64,
    pub max_response_bytes: u64,
    pub trigger: TriggerSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let analysis = AnalysisSettings::default();
        Self {
            debounce_ms: 150,
            frame_interval_ms: 16,
            endpoint: analysis.endpoint,
            connect_timeout_ms: analysis.connect_timeout.as_millis() as u64,
            http_timeout_ms: analysis.request_timeout.as_millis() as u64,
            max_response_bytes: analysis.max_bytes,
            trigger: TriggerSettings::default(),
        }
    }
}

impl AgentSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn analysis(&self) -> AnalysisSettings {
        AnalysisSettings {
            endpoint: self.endpoint.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.http_timeout_ms),
            max_bytes: self.max_response_bytes,
        }
    }

    pub fn from_ron(text: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String, SettingsError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::new(),
        )?)
    }
}

/// Reads settings from `path`, falling back to defaults when the file is
/// missing or invalid.
pub fn load_settings(path: &Path) -> AgentSettings {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            agent_info!("no settings at {:?}; using defaults", path);
            return AgentSettings::default();
        }
        Err(err) => {
            agent_warn!("Failed to read settings from {:?}: {}", path, err);
            return AgentSettings::default();
        }
    };

    match AgentSettings::from_ron(&content) {
        Ok(settings) => {
            agent_info!("Loaded settings from {:?}", path);
            settings
        }
        Err(err) => {
            agent_warn!("Failed to parse settings from {:?}: {}", path, err);
            AgentSettings::default()
        }
    }
}

/// Writes settings as pretty RON.
pub fn save_settings(path: &Path, settings: &AgentSettings) -> Result<(), SettingsError> {
    fs::write(path, settings.to_ron()?)?;
    Ok(())
}
