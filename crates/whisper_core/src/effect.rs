use crate::{ConversationId, DismissReason, ObservedMessage, RequestId, Suggestion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send one attempt of a request to the analysis service.
    RequestAnalysis {
        conversation_id: ConversationId,
        request_id: RequestId,
        correlation_id: String,
        context_window: Vec<ObservedMessage>,
    },
    /// Deliver `Msg::RequestTimedOut` after `after_ms`.
    ScheduleTimeout {
        conversation_id: ConversationId,
        request_id: RequestId,
        after_ms: u64,
    },
    /// Drop any in-flight attempt of the request; its result is stale from now on.
    CancelAnalysis {
        conversation_id: ConversationId,
        request_id: RequestId,
    },
    ShowSuggestion {
        conversation_id: ConversationId,
        request_id: RequestId,
        suggestions: Vec<Suggestion>,
    },
    WithdrawSuggestion {
        conversation_id: ConversationId,
        reason: DismissReason,
    },
}
