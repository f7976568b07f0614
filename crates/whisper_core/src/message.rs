use serde::{Deserialize, Serialize};

pub type ConversationId = String;
pub type MessageId = String;
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Where an observed message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    #[default]
    Dom,
    /// Injected through the introspection interface.
    Synthetic,
}

/// A single chat message as seen in the host page.
///
/// `sender` and `timestamp` are empty when the platform adapter cannot
/// resolve them; `first_seen_at` is the agent clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedMessage {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub sender: String,
    pub direction: Direction,
    pub text: String,
    pub timestamp: String,
    pub first_seen_at: u64,
    #[serde(default)]
    pub origin: MessageOrigin,
}

impl ObservedMessage {
    pub fn is_synthetic(&self) -> bool {
        self.origin == MessageOrigin::Synthetic
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub request_id: RequestId,
    pub text: String,
    pub rank: u32,
}

impl Suggestion {
    pub(crate) fn ranked(request_id: RequestId, texts: Vec<String>) -> Vec<Suggestion> {
        texts
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(rank, text)| Suggestion {
                request_id,
                text,
                rank: rank as u32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Suggestion;

    #[test]
    fn ranking_follows_service_order_and_drops_blank_entries() {
        let ranked = Suggestion::ranked(
            4,
            vec![" first ".to_string(), "   ".to_string(), "second".to_string()],
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "first");
        assert_eq!(ranked[0].rank, 0);
        assert_eq!(ranked[1].text, "second");
        assert_eq!(ranked[1].rank, 1);
    }
}
