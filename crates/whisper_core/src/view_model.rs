use serde::Serialize;

use crate::{RequestId, RequestStatus, TriggerPhase};

/// Read-only snapshot of every tracked conversation, used by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AgentView {
    pub conversations: Vec<ConversationView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub phase: TriggerPhase,
    pub seen_count: usize,
    pub last_seen_message_id: Option<String>,
    pub pending_request: Option<PendingRequestView>,
    pub last_resolution: Option<RequestStatus>,
    pub overlay_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequestView {
    pub request_id: RequestId,
    pub attempt: u32,
    pub context_len: usize,
    pub coalesced: usize,
    pub created_at: u64,
}
