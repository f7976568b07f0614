use crate::{Direction, ObservedMessage, TriggerSettings};

/// Everything a policy may look at when a new message arrives.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub conversation_id: &'a str,
    /// The message that caused this evaluation.
    pub latest: &'a ObservedMessage,
    /// Messages recorded since the last request was started, `latest` included.
    pub new_messages: &'a [ObservedMessage],
    /// Time since the last delivered suggestion, if any.
    pub since_last_delivery_ms: Option<u64>,
    /// Set for messages injected through `force_suggestion`.
    pub forced: bool,
}

/// Decides whether a suggestion request is warranted.
pub trait TriggerPolicy {
    fn should_trigger(&self, ctx: &TriggerContext<'_>) -> bool;
}

/// Keyword, cooldown and message-count heuristics.
///
/// Forced evaluations always trigger. Otherwise only incoming messages are
/// considered, nothing fires inside the cooldown, and then either a keyword
/// hit or enough new incoming messages is sufficient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicPolicy {
    cooldown_ms: u64,
    min_new_messages: usize,
    keywords: Vec<String>,
}

impl HeuristicPolicy {
    pub fn from_settings(settings: &TriggerSettings) -> Self {
        Self {
            cooldown_ms: settings.cooldown_ms,
            min_new_messages: settings.min_new_messages,
            keywords: settings
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keyword_hit(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

impl TriggerPolicy for HeuristicPolicy {
    fn should_trigger(&self, ctx: &TriggerContext<'_>) -> bool {
        if ctx.forced {
            return true;
        }
        if ctx.latest.direction != Direction::Incoming {
            return false;
        }
        if matches!(ctx.since_last_delivery_ms, Some(elapsed) if elapsed < self.cooldown_ms) {
            return false;
        }
        if self.keyword_hit(&ctx.latest.text) {
            return true;
        }
        let incoming = ctx
            .new_messages
            .iter()
            .filter(|m| m.direction == Direction::Incoming)
            .count();
        self.min_new_messages > 0 && incoming >= self.min_new_messages
    }
}
