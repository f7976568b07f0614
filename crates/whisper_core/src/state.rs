use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;

use crate::view_model::{AgentView, ConversationView, PendingRequestView};
use crate::{ConversationId, MessageId, ObservedMessage, RequestId, Suggestion, TriggerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Failed,
    Cancelled,
    TimedOut,
}

/// Externally visible phase of a conversation's trigger state machine.
///
/// `Evaluating` and the terminal outcomes are transient within a single
/// update, so only the two resting phases are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    #[default]
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    User,
    Superseded,
    ConversationChanged,
    AnchorLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Hidden,
    Shown {
        request_id: RequestId,
        suggestions: Vec<Suggestion>,
        anchor_missing_since: Option<u64>,
    },
}

impl OverlayState {
    pub fn is_visible(&self) -> bool {
        matches!(self, OverlayState::Shown { .. })
    }
}

/// The single outstanding analysis request of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRequest {
    pub request_id: RequestId,
    pub conversation_id: ConversationId,
    pub context_window: Vec<ObservedMessage>,
    pub status: RequestStatus,
    pub created_at: u64,
    /// 1 for the first attempt, incremented per retry.
    pub attempt: u32,
    /// Correlation id of the attempt currently in flight.
    pub correlation_id: String,
    /// Messages that arrived while this request was awaiting a response.
    pub coalesced: Vec<ObservedMessage>,
}

impl SuggestionRequest {
    pub(crate) fn correlation_for(request_id: RequestId, attempt: u32) -> String {
        format!("req-{request_id}.{attempt}")
    }

    pub(crate) fn matches(&self, request_id: RequestId, correlation_id: &str) -> bool {
        self.request_id == request_id && self.correlation_id == correlation_id
    }
}

/// Insertion-ordered set of message ids with a fixed capacity; the oldest ids
/// are evicted first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeenSet {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
    capacity: usize,
}

impl SeenSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    conversation_id: ConversationId,
    seen: SeenSet,
    last_seen_message_id: Option<MessageId>,
    history: VecDeque<ObservedMessage>,
    history_capacity: usize,
    pub(crate) new_since_last_request: Vec<ObservedMessage>,
    pub(crate) pending: Option<SuggestionRequest>,
    pub(crate) last_resolution: Option<RequestStatus>,
    pub(crate) last_delivered_at: Option<u64>,
    pub(crate) overlay: OverlayState,
}

impl ConversationState {
    pub(crate) fn new(conversation_id: ConversationId, settings: &TriggerSettings) -> Self {
        Self {
            conversation_id,
            seen: SeenSet::with_capacity(settings.seen_capacity),
            last_seen_message_id: None,
            history: VecDeque::new(),
            history_capacity: settings.history_capacity.max(1),
            new_since_last_request: Vec::new(),
            pending: None,
            last_resolution: None,
            last_delivered_at: None,
            overlay: OverlayState::Hidden,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn phase(&self) -> TriggerPhase {
        if self.pending.is_some() {
            TriggerPhase::AwaitingResponse
        } else {
            TriggerPhase::Idle
        }
    }

    pub fn pending_request(&self) -> Option<&SuggestionRequest> {
        self.pending.as_ref()
    }

    pub fn last_resolution(&self) -> Option<RequestStatus> {
        self.last_resolution
    }

    pub fn last_seen_message_id(&self) -> Option<&str> {
        self.last_seen_message_id.as_deref()
    }

    pub fn has_seen(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    /// Last `n` recorded messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<ObservedMessage> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Records a message unless its id was seen before. Returns whether it was new.
    pub(crate) fn record(&mut self, message: &ObservedMessage) -> bool {
        if !self.seen.insert(message.message_id.clone()) {
            return false;
        }
        self.last_seen_message_id = Some(message.message_id.clone());
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(message.clone());
        true
    }

    fn view(&self) -> ConversationView {
        ConversationView {
            conversation_id: self.conversation_id.clone(),
            phase: self.phase(),
            seen_count: self.seen.len(),
            last_seen_message_id: self.last_seen_message_id.clone(),
            pending_request: self.pending.as_ref().map(|req| PendingRequestView {
                request_id: req.request_id,
                attempt: req.attempt,
                context_len: req.context_window.len(),
                coalesced: req.coalesced.len(),
                created_at: req.created_at,
            }),
            last_resolution: self.last_resolution,
            overlay_visible: self.overlay.is_visible(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    settings: TriggerSettings,
    conversations: BTreeMap<ConversationId, ConversationState>,
    next_request_id: RequestId,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_settings(TriggerSettings::default())
    }

    pub fn with_settings(settings: TriggerSettings) -> Self {
        Self {
            settings,
            conversations: BTreeMap::new(),
            next_request_id: 1,
        }
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&ConversationState> {
        self.conversations.get(conversation_id)
    }

    pub fn view(&self) -> AgentView {
        AgentView {
            conversations: self.conversations.values().map(ConversationState::view).collect(),
        }
    }

    pub(crate) fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    pub(crate) fn conversation_mut(&mut self, conversation_id: &str) -> Option<&mut ConversationState> {
        self.conversations.get_mut(conversation_id)
    }

    pub(crate) fn conversation_or_insert(&mut self, conversation_id: &str) -> &mut ConversationState {
        let settings = &self.settings;
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationState::new(conversation_id.to_string(), settings))
    }

    pub(crate) fn remove_conversation(&mut self, conversation_id: &str) -> Option<ConversationState> {
        self.conversations.remove(conversation_id)
    }

    pub(crate) fn conversation_ids(&self) -> Vec<ConversationId> {
        self.conversations.keys().cloned().collect()
    }

    pub(crate) fn allocate_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::SeenSet;

    #[test]
    fn seen_set_rejects_duplicates_and_evicts_oldest() {
        let mut seen = SeenSet::with_capacity(2);
        assert!(seen.insert("a".to_string()));
        assert!(!seen.insert("a".to_string()));
        assert!(seen.insert("b".to_string()));
        assert!(seen.insert("c".to_string()));
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
    }
}
