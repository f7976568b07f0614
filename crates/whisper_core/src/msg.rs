use crate::{ConversationId, ObservedMessage, RequestId};

/// Inputs to the trigger engine. `now` is the agent clock in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A conversation became active; `existing` is the history already on screen,
    /// which is marked as seen without evaluation.
    ConversationOpened {
        conversation_id: ConversationId,
        existing: Vec<ObservedMessage>,
    },
    /// Finalised messages from the observer, in DOM order.
    MessagesObserved {
        conversation_id: ConversationId,
        messages: Vec<ObservedMessage>,
        now: u64,
    },
    /// Synthetic message from the introspection interface.
    SuggestionForced { message: ObservedMessage, now: u64 },
    /// The analysis service answered an attempt.
    AnalysisSucceeded {
        conversation_id: ConversationId,
        request_id: RequestId,
        correlation_id: String,
        suggestions: Vec<String>,
        now: u64,
    },
    /// The analysis service failed an attempt.
    AnalysisFailed {
        conversation_id: ConversationId,
        request_id: RequestId,
        correlation_id: String,
        transient: bool,
        reason: String,
        now: u64,
    },
    /// The timeout scheduled for a request elapsed.
    RequestTimedOut {
        conversation_id: ConversationId,
        request_id: RequestId,
        now: u64,
    },
    /// The user navigated away from the conversation.
    ConversationLeft { conversation_id: ConversationId },
    /// The host tab is going away.
    PageUnloaded,
    /// User closed the suggestion bubble.
    SuggestionDismissed { conversation_id: ConversationId },
    /// Animation-frame anchor check while a suggestion is visible.
    AnchorChecked {
        conversation_id: ConversationId,
        present: bool,
        now: u64,
    },
    /// The overlay surface could not mount the suggestion of `request_id`.
    SuggestionNotShown {
        conversation_id: ConversationId,
        request_id: RequestId,
    },
}
