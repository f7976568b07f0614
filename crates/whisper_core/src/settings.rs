use serde::{Deserialize, Serialize};

/// Tunables for the trigger engine and the overlay lifecycle.
///
/// All durations are milliseconds on the agent clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    /// Minimum time after a delivered suggestion before the heuristics may fire again.
    pub cooldown_ms: u64,
    /// Upper bound for a request, retries included.
    pub request_timeout_ms: u64,
    /// Automatic retries for transient failures.
    pub max_retries: u32,
    /// Number of most recent messages sent with a request.
    pub context_window: usize,
    /// Incoming messages needed since the last request when no keyword matches.
    pub min_new_messages: usize,
    /// Lower-case phrases that trigger a request on their own.
    pub keywords: Vec<String>,
    /// How long the composer anchor may be missing before the overlay withdraws.
    pub anchor_grace_ms: u64,
    /// Upper bound of remembered message ids per conversation.
    pub seen_capacity: usize,
    /// Upper bound of retained messages per conversation.
    pub history_capacity: usize,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 30_000,
            request_timeout_ms: 10_000,
            max_retries: 1,
            context_window: 10,
            min_new_messages: 3,
            keywords: default_keywords(),
            anchor_grace_ms: 500,
            seen_capacity: 2_000,
            history_capacity: 200,
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "upset",
        "angry",
        "annoyed",
        "frustrated",
        "sad",
        "hurt",
        "disappointed",
        "worried",
        "anxious",
        "stressed",
        "sorry",
        "hate",
        "miss you",
        "love you",
        "break up",
        "whatever",
        "leave me alone",
    ]
    .iter()
    .map(|k| (*k).to_string())
    .collect()
}
