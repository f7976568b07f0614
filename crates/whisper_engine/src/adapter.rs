use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;
use whisper_logging::{agent_debug, agent_error, agent_warn};

const BUILTIN_ADAPTERS: &str = include_str!("../adapters/default_adapters.json");

/// Selector bundle for one messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub platform_id: String,
    pub host_patterns: Vec<String>,
    pub message_list_selector: String,
    pub message_item_selector: String,
    pub sender_selector: String,
    pub timestamp_selector: String,
    pub text_selector: String,
    pub composer_selector: String,
    pub send_button_selector: String,
    /// An item matching (or containing) this selector was sent by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing_selector: Option<String>,
    /// Text of the first match names the open conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_selector: Option<String>,
    /// Item attribute carrying a platform-assigned message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id_attribute: Option<String>,
}

/// The selector fields every adapter must provide, in report order.
pub const SELECTOR_FIELDS: [&str; 7] = [
    "messageListSelector",
    "messageItemSelector",
    "senderSelector",
    "timestampSelector",
    "textSelector",
    "composerSelector",
    "sendButtonSelector",
];

impl PlatformConfig {
    /// Raw selector text for one of [`SELECTOR_FIELDS`].
    pub fn selector(&self, field: &str) -> Option<&str> {
        let value = match field {
            "messageListSelector" => &self.message_list_selector,
            "messageItemSelector" => &self.message_item_selector,
            "senderSelector" => &self.sender_selector,
            "timestampSelector" => &self.timestamp_selector,
            "textSelector" => &self.text_selector,
            "composerSelector" => &self.composer_selector,
            "sendButtonSelector" => &self.send_button_selector,
            "outgoingSelector" => self.outgoing_selector.as_ref()?,
            "conversationSelector" => self.conversation_selector.as_ref()?,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Parses a selector field; empty or invalid selectors yield `None`.
    pub fn compile(&self, field: &str) -> Option<Selector> {
        compile_selector(self.selector(field)?)
    }

    fn validate(&self) -> AdapterHealth {
        let mut reasons = Vec::new();
        if self.platform_id.trim().is_empty() {
            reasons.push("platformId is empty".to_string());
        }
        if self.host_patterns.iter().all(|p| HostPattern::parse(p).is_none()) {
            reasons.push("hostPatterns has no usable pattern".to_string());
        }
        let optional = ["outgoingSelector", "conversationSelector"];
        for field in SELECTOR_FIELDS.iter().chain(optional.iter()) {
            let Some(raw) = self.selector(field) else {
                continue;
            };
            if raw.trim().is_empty() {
                reasons.push(format!("{field} is empty"));
            } else if compile_selector(raw).is_none() {
                reasons.push(format!("{field} is not a valid selector: {raw}"));
            }
        }
        if reasons.is_empty() {
            AdapterHealth::Healthy
        } else {
            AdapterHealth::Degraded { reasons }
        }
    }
}

pub(crate) fn compile_selector(raw: &str) -> Option<Selector> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Selector::parse(trimmed).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Degraded { reasons: Vec<String> },
}

impl AdapterHealth {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AdapterHealth::Degraded { .. })
    }

    /// Adds a runtime finding, e.g. a DOM-order violation.
    pub fn degrade(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        match self {
            AdapterHealth::Healthy => *self = AdapterHealth::Degraded { reasons: vec![reason] },
            AdapterHealth::Degraded { reasons } => {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
    }
}

/// Host pattern forms: `example.com` (exact), `*.example.com` (domain and any
/// subdomain) and `*example*` (substring).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subdomain(String),
    Substring(String),
}

impl HostPattern {
    pub fn parse(raw: &str) -> Option<Self> {
        let pattern = raw.trim().trim_end_matches('.').to_ascii_lowercase();
        if let Some(domain) = pattern.strip_prefix("*.") {
            return (!domain.is_empty()).then(|| HostPattern::Subdomain(domain.to_string()));
        }
        if pattern.len() > 2 && pattern.starts_with('*') && pattern.ends_with('*') {
            let needle = pattern.trim_matches('*');
            return (!needle.is_empty()).then(|| HostPattern::Substring(needle.to_string()));
        }
        if pattern.is_empty() || pattern.contains('*') {
            return None;
        }
        Some(HostPattern::Exact(pattern))
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(domain) => host == domain,
            HostPattern::Subdomain(domain) => {
                host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            HostPattern::Substring(needle) => host.contains(needle.as_str()),
        }
    }
}

/// Lower-cases a host and strips a port and trailing dot.
pub fn normalize_host(hostname: &str) -> String {
    let host = hostname.trim().to_ascii_lowercase();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host,
    };
    host.trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAdapter {
    pub config: PlatformConfig,
    pub health: AdapterHealth,
    patterns: Vec<HostPattern>,
}

impl LoadedAdapter {
    fn new(config: PlatformConfig) -> Self {
        let health = config.validate();
        if let AdapterHealth::Degraded { reasons } = &health {
            agent_warn!(
                "adapter {} loaded degraded: {}",
                config.platform_id,
                reasons.join("; ")
            );
        }
        let patterns = config
            .host_patterns
            .iter()
            .filter_map(|p| HostPattern::parse(p))
            .collect();
        Self {
            config,
            health,
            patterns,
        }
    }

    fn matches(&self, host: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(host))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Supported(&'a LoadedAdapter),
    NotSupported,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("adapter document is not valid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct AdapterDocument {
    adapters: Vec<PlatformConfig>,
}

/// Ordered adapter table; the first adapter with a matching host pattern wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterRegistry {
    adapters: Vec<LoadedAdapter>,
}

impl AdapterRegistry {
    pub fn from_configs(configs: Vec<PlatformConfig>) -> Self {
        let mut adapters: Vec<LoadedAdapter> = Vec::with_capacity(configs.len());
        for config in configs {
            if adapters
                .iter()
                .any(|a| a.config.platform_id == config.platform_id)
            {
                agent_warn!("duplicate adapter {} ignored", config.platform_id);
                continue;
            }
            adapters.push(LoadedAdapter::new(config));
        }
        Self { adapters }
    }

    /// Loads `{"adapters": [PlatformConfig, ...]}`.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let document: AdapterDocument = serde_json::from_str(json)?;
        Ok(Self::from_configs(document.adapters))
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adapters shipped with the agent.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_ADAPTERS).unwrap_or_else(|err| {
            agent_error!("built-in adapter document rejected: {}", err);
            Self::default()
        })
    }

    pub fn adapters(&self) -> &[LoadedAdapter] {
        &self.adapters
    }

    pub fn resolve(&self, hostname: &str) -> Resolution<'_> {
        let host = normalize_host(hostname);
        match self.adapters.iter().find(|a| a.matches(&host)) {
            Some(adapter) => Resolution::Supported(adapter),
            None => {
                agent_debug!("no adapter for {}", host);
                Resolution::NotSupported
            }
        }
    }

    /// Resolves the host part of a page URL.
    pub fn resolve_url(&self, page_url: &str) -> Resolution<'_> {
        match Url::parse(page_url).ok().and_then(|u| u.host_str().map(str::to_owned)) {
            Some(host) => self.resolve(&host),
            None => Resolution::NotSupported,
        }
    }
}
