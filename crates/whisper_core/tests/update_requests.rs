use std::sync::Once;

use pretty_assertions::assert_eq;
use whisper_core::{
    update, update_with_policy, AppState, Direction, Effect, MessageOrigin, Msg, ObservedMessage,
    RequestStatus, TriggerContext, TriggerPhase, TriggerPolicy,
};

const CONV: &str = "app.slack.com/client/T1/C1";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(whisper_logging::initialize_for_tests);
}

fn incoming(id: &str, text: &str) -> ObservedMessage {
    ObservedMessage {
        conversation_id: CONV.to_string(),
        message_id: id.to_string(),
        sender: "Sam".to_string(),
        direction: Direction::Incoming,
        text: text.to_string(),
        timestamp: "9:41 AM".to_string(),
        first_seen_at: 0,
        origin: MessageOrigin::Dom,
    }
}

fn observe(state: AppState, messages: Vec<ObservedMessage>, now: u64) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::MessagesObserved {
            conversation_id: CONV.to_string(),
            messages,
            now,
        },
    )
}

fn started() -> AppState {
    let (state, effects) = observe(AppState::new(), vec![incoming("m1", "I'm so frustrated")], 0);
    assert_eq!(effects.len(), 2);
    state
}

fn succeed(state: AppState, request_id: u64, correlation_id: &str, now: u64) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::AnalysisSucceeded {
            conversation_id: CONV.to_string(),
            request_id,
            correlation_id: correlation_id.to_string(),
            suggestions: vec!["Acknowledge the frustration".to_string()],
            now,
        },
    )
}

fn fail(
    state: AppState,
    request_id: u64,
    correlation_id: &str,
    transient: bool,
) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::AnalysisFailed {
            conversation_id: CONV.to_string(),
            request_id,
            correlation_id: correlation_id.to_string(),
            transient,
            reason: "boom".to_string(),
            now: 500,
        },
    )
}

#[test]
fn timeout_releases_slot_and_late_response_is_discarded() {
    init_logging();
    let state = started();

    let (state, effects) = update(
        state,
        Msg::RequestTimedOut {
            conversation_id: CONV.to_string(),
            request_id: 1,
            now: 10_000,
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelAnalysis {
            conversation_id: CONV.to_string(),
            request_id: 1,
        }]
    );
    let conversation = state.conversation(CONV).unwrap();
    assert_eq!(conversation.phase(), TriggerPhase::Idle);
    assert_eq!(conversation.last_resolution(), Some(RequestStatus::TimedOut));

    let (state, effects) = succeed(state, 1, "req-1.1", 10_500);
    assert!(effects.is_empty());
    assert!(!state.conversation(CONV).unwrap().overlay().is_visible());

    let (state, effects) = observe(state, vec![incoming("m2", "I am frustrated again")], 11_000);
    assert!(matches!(
        effects.first(),
        Some(Effect::RequestAnalysis { request_id: 2, .. })
    ));
    assert_eq!(
        state.conversation(CONV).unwrap().phase(),
        TriggerPhase::AwaitingResponse
    );
}

#[test]
fn stale_timeout_is_ignored() {
    init_logging();
    let state = started();
    let (state, effects) = update(
        state,
        Msg::RequestTimedOut {
            conversation_id: CONV.to_string(),
            request_id: 99,
            now: 10_000,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.conversation(CONV).unwrap().phase(),
        TriggerPhase::AwaitingResponse
    );
}

#[test]
fn transient_failure_is_retried_once_with_same_context() {
    init_logging();
    let state = started();

    let (state, effects) = fail(state, 1, "req-1.1", true);
    assert_eq!(
        effects,
        vec![Effect::RequestAnalysis {
            conversation_id: CONV.to_string(),
            request_id: 1,
            correlation_id: "req-1.2".to_string(),
            context_window: vec![incoming("m1", "I'm so frustrated")],
        }]
    );

    // The first attempt's answer is now stale.
    let (state, effects) = succeed(state, 1, "req-1.1", 600);
    assert!(effects.is_empty());
    assert_eq!(
        state.conversation(CONV).unwrap().phase(),
        TriggerPhase::AwaitingResponse
    );

    let (state, effects) = fail(state, 1, "req-1.2", true);
    assert!(effects.is_empty());
    let conversation = state.conversation(CONV).unwrap();
    assert_eq!(conversation.phase(), TriggerPhase::Idle);
    assert_eq!(conversation.last_resolution(), Some(RequestStatus::Failed));
}

#[test]
fn permanent_failure_is_not_retried() {
    init_logging();
    let state = started();
    let (state, effects) = fail(state, 1, "req-1.1", false);
    assert!(effects.is_empty());
    assert_eq!(
        state.conversation(CONV).unwrap().last_resolution(),
        Some(RequestStatus::Failed)
    );
}

#[test]
fn deferred_messages_start_next_request_after_failure() {
    init_logging();
    let state = started();
    let (state, effects) = observe(state, vec![incoming("m2", "I'm angry now")], 100);
    assert!(effects.is_empty());

    let (_, effects) = fail(state, 1, "req-1.1", false);
    match effects.first() {
        Some(Effect::RequestAnalysis {
            request_id,
            context_window,
            ..
        }) => {
            assert_eq!(*request_id, 2);
            let ids: Vec<_> = context_window.iter().map(|m| m.message_id.as_str()).collect();
            assert_eq!(ids, vec!["m1", "m2"]);
        }
        other => panic!("expected a new request, got {other:?}"),
    }
}

#[test]
fn leaving_conversation_cancels_and_discards_late_response() {
    init_logging();
    let state = started();

    let (state, effects) = update(
        state,
        Msg::ConversationLeft {
            conversation_id: CONV.to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelAnalysis {
            conversation_id: CONV.to_string(),
            request_id: 1,
        }]
    );
    assert!(state.conversation(CONV).is_none());

    let (state, effects) = succeed(state, 1, "req-1.1", 3_000);
    assert!(effects.is_empty());
    assert!(state.conversation(CONV).is_none());
}

#[test]
fn conversations_are_independent() {
    init_logging();
    let state = started();
    let mut other = incoming("z1", "I'm upset");
    other.conversation_id = "other".to_string();
    let (state, effects) = update(
        state,
        Msg::MessagesObserved {
            conversation_id: "other".to_string(),
            messages: vec![other],
            now: 10,
        },
    );
    assert!(matches!(
        effects.first(),
        Some(Effect::RequestAnalysis { request_id: 2, .. })
    ));
    assert_eq!(state.view().conversations.len(), 2);
}

struct Never;

impl TriggerPolicy for Never {
    fn should_trigger(&self, _ctx: &TriggerContext<'_>) -> bool {
        false
    }
}

#[test]
fn custom_policy_is_consulted() {
    init_logging();
    let (state, effects) = update_with_policy(
        AppState::new(),
        Msg::MessagesObserved {
            conversation_id: CONV.to_string(),
            messages: vec![incoming("m1", "I'm so upset")],
            now: 0,
        },
        &Never,
    );
    assert!(effects.is_empty());
    assert_eq!(state.conversation(CONV).unwrap().seen_count(), 1);
}
