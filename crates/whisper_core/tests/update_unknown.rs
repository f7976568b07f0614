use whisper_core::{update, AppState, Msg};

#[test]
fn events_for_unknown_conversations_are_ignored() {
    let state = AppState::new();
    let (next, effects) = update(
        state.clone(),
        Msg::AnalysisSucceeded {
            conversation_id: "nowhere".to_string(),
            request_id: 1,
            correlation_id: "req-1.1".to_string(),
            suggestions: vec!["hi".to_string()],
            now: 0,
        },
    );
    assert_eq!(state, next);
    assert!(effects.is_empty());

    let (next, effects) = update(
        next,
        Msg::ConversationLeft {
            conversation_id: "nowhere".to_string(),
        },
    );
    assert_eq!(state, next);
    assert!(effects.is_empty());
}
