use whisper_logging::{agent_debug, agent_info, agent_trace, agent_warn};

use crate::policy::{HeuristicPolicy, TriggerContext, TriggerPolicy};
use crate::state::{ConversationState, OverlayState, SuggestionRequest};
use crate::{
    AppState, DismissReason, Effect, Msg, ObservedMessage, RequestId, RequestStatus, Suggestion,
};

/// Pure update function: applies a message to state and returns any effects.
///
/// Uses [`HeuristicPolicy`] built from the state's settings.
pub fn update(state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let policy = HeuristicPolicy::from_settings(state.settings());
    update_with_policy(state, msg, &policy)
}

/// Same as [`update`] with a caller-supplied trigger policy.
pub fn update_with_policy(
    mut state: AppState,
    msg: Msg,
    policy: &dyn TriggerPolicy,
) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::ConversationOpened {
            conversation_id,
            existing,
        } => {
            // State may already exist from a forced message; history is primed either way.
            let tracked = state.contains(&conversation_id);
            let conversation = state.conversation_or_insert(&conversation_id);
            let primed = existing.iter().filter(|m| conversation.record(m)).count();
            if tracked {
                agent_debug!(
                    "conversation {} already tracked; primed {} more messages",
                    conversation_id,
                    primed
                );
            } else {
                agent_info!(
                    "conversation {} opened with {} existing messages",
                    conversation_id,
                    primed
                );
            }
            Vec::new()
        }
        Msg::MessagesObserved {
            conversation_id,
            messages,
            now,
        } => {
            let mut effects = Vec::new();
            for message in messages {
                effects.extend(observe(
                    &mut state,
                    &conversation_id,
                    message,
                    false,
                    now,
                    policy,
                ));
            }
            effects
        }
        Msg::SuggestionForced { message, now } => {
            let conversation_id = message.conversation_id.clone();
            observe(&mut state, &conversation_id, message, true, now, policy)
        }
        Msg::AnalysisSucceeded {
            conversation_id,
            request_id,
            correlation_id,
            suggestions,
            now,
        } => on_analysis_succeeded(
            &mut state,
            &conversation_id,
            request_id,
            &correlation_id,
            suggestions,
            now,
            policy,
        ),
        Msg::AnalysisFailed {
            conversation_id,
            request_id,
            correlation_id,
            transient,
            reason,
            now,
        } => on_analysis_failed(
            &mut state,
            &conversation_id,
            request_id,
            &correlation_id,
            transient,
            &reason,
            now,
            policy,
        ),
        Msg::RequestTimedOut {
            conversation_id,
            request_id,
            now,
        } => on_timeout(&mut state, &conversation_id, request_id, now, policy),
        Msg::ConversationLeft { conversation_id } => leave(&mut state, &conversation_id),
        Msg::PageUnloaded => {
            let mut effects = Vec::new();
            for conversation_id in state.conversation_ids() {
                effects.extend(leave(&mut state, &conversation_id));
            }
            effects
        }
        Msg::SuggestionDismissed { conversation_id } => match state.conversation_mut(&conversation_id)
        {
            Some(conversation) if conversation.overlay.is_visible() => {
                conversation.overlay = OverlayState::Hidden;
                vec![Effect::WithdrawSuggestion {
                    conversation_id,
                    reason: DismissReason::User,
                }]
            }
            _ => Vec::new(),
        },
        Msg::AnchorChecked {
            conversation_id,
            present,
            now,
        } => on_anchor_checked(&mut state, &conversation_id, present, now),
        Msg::SuggestionNotShown {
            conversation_id,
            request_id,
        } => {
            if let Some(conversation) = state.conversation_mut(&conversation_id) {
                let showing = matches!(
                    conversation.overlay,
                    OverlayState::Shown { request_id: shown, .. } if shown == request_id
                );
                if showing {
                    agent_warn!("suggestion {} was never mounted", request_id);
                    conversation.overlay = OverlayState::Hidden;
                }
            }
            Vec::new()
        }
    };

    (state, effects)
}

/// Records a message and runs it through the `Evaluating` transition, or folds it
/// into the pending request when one is awaiting a response.
fn observe(
    state: &mut AppState,
    conversation_id: &str,
    message: ObservedMessage,
    forced: bool,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    let conversation = state.conversation_or_insert(conversation_id);
    if !conversation.record(&message) {
        agent_trace!("message {} already seen", message.message_id);
        return Vec::new();
    }
    if let Some(pending) = conversation.pending.as_mut() {
        pending.coalesced.push(message);
        agent_debug!(
            "request {} still awaiting; {} message(s) deferred",
            pending.request_id,
            pending.coalesced.len()
        );
        return Vec::new();
    }
    conversation.new_since_last_request.push(message);
    evaluate(state, conversation_id, forced, now, policy)
}

fn evaluate(
    state: &mut AppState,
    conversation_id: &str,
    forced: bool,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    let should_trigger = {
        let Some(conversation) = state.conversation(conversation_id) else {
            return Vec::new();
        };
        let Some(latest) = conversation.new_since_last_request.last() else {
            return Vec::new();
        };
        let ctx = TriggerContext {
            conversation_id,
            latest,
            new_messages: &conversation.new_since_last_request,
            since_last_delivery_ms: conversation
                .last_delivered_at
                .map(|at| now.saturating_sub(at)),
            forced,
        };
        policy.should_trigger(&ctx)
    };

    if should_trigger {
        start_request(state, conversation_id, now)
    } else {
        agent_trace!("policy declined for {}", conversation_id);
        Vec::new()
    }
}

fn start_request(state: &mut AppState, conversation_id: &str, now: u64) -> Vec<Effect> {
    let request_id = state.allocate_request_id();
    let window = state.settings().context_window;
    let timeout_ms = state.settings().request_timeout_ms;
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        return Vec::new();
    };

    let context_window = conversation.recent_messages(window);
    let correlation_id = SuggestionRequest::correlation_for(request_id, 1);
    conversation.new_since_last_request.clear();
    conversation.pending = Some(SuggestionRequest {
        request_id,
        conversation_id: conversation_id.to_string(),
        context_window: context_window.clone(),
        status: RequestStatus::Pending,
        created_at: now,
        attempt: 1,
        correlation_id: correlation_id.clone(),
        coalesced: Vec::new(),
    });
    agent_info!(
        "request {} started with {} context messages",
        request_id,
        context_window.len()
    );

    vec![
        Effect::RequestAnalysis {
            conversation_id: conversation_id.to_string(),
            request_id,
            correlation_id,
            context_window,
        },
        Effect::ScheduleTimeout {
            conversation_id: conversation_id.to_string(),
            request_id,
            after_ms: timeout_ms,
        },
    ]
}

fn is_current(conversation: &ConversationState, request_id: RequestId, correlation_id: &str) -> bool {
    conversation
        .pending
        .as_ref()
        .is_some_and(|pending| pending.matches(request_id, correlation_id))
}

fn finish_request(
    conversation: &mut ConversationState,
    status: RequestStatus,
) -> Option<SuggestionRequest> {
    let mut request = conversation.pending.take()?;
    request.status = status;
    conversation.last_resolution = Some(status);
    Some(request)
}

/// Re-evaluates messages that were coalesced into a request that just resolved.
fn resume_deferred(
    state: &mut AppState,
    conversation_id: &str,
    coalesced: Vec<ObservedMessage>,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    if coalesced.is_empty() {
        return Vec::new();
    }
    let forced = coalesced.iter().any(ObservedMessage::is_synthetic);
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        return Vec::new();
    };
    agent_debug!("re-evaluating {} deferred message(s)", coalesced.len());
    conversation.new_since_last_request.extend(coalesced);
    evaluate(state, conversation_id, forced, now, policy)
}

fn on_analysis_succeeded(
    state: &mut AppState,
    conversation_id: &str,
    request_id: RequestId,
    correlation_id: &str,
    texts: Vec<String>,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        agent_debug!("discarding stale response {} (conversation gone)", correlation_id);
        return Vec::new();
    };
    if !is_current(conversation, request_id, correlation_id) {
        agent_debug!("discarding stale response {}", correlation_id);
        return Vec::new();
    }
    let Some(request) = finish_request(conversation, RequestStatus::Fulfilled) else {
        return Vec::new();
    };
    conversation.last_delivered_at = Some(now);

    let mut effects = Vec::new();
    let suggestions = Suggestion::ranked(request_id, texts);
    if suggestions.is_empty() {
        agent_info!("request {} fulfilled without suggestions", request_id);
    } else {
        if conversation.overlay.is_visible() {
            effects.push(Effect::WithdrawSuggestion {
                conversation_id: conversation_id.to_string(),
                reason: DismissReason::Superseded,
            });
        }
        conversation.overlay = OverlayState::Shown {
            request_id,
            suggestions: suggestions.clone(),
            anchor_missing_since: None,
        };
        effects.push(Effect::ShowSuggestion {
            conversation_id: conversation_id.to_string(),
            request_id,
            suggestions,
        });
    }

    effects.extend(resume_deferred(
        state,
        conversation_id,
        request.coalesced,
        now,
        policy,
    ));
    effects
}

#[allow(clippy::too_many_arguments)]
fn on_analysis_failed(
    state: &mut AppState,
    conversation_id: &str,
    request_id: RequestId,
    correlation_id: &str,
    transient: bool,
    reason: &str,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    let max_retries = state.settings().max_retries;
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        agent_debug!("discarding stale failure {} (conversation gone)", correlation_id);
        return Vec::new();
    };
    if !is_current(conversation, request_id, correlation_id) {
        agent_debug!("discarding stale failure {}", correlation_id);
        return Vec::new();
    }

    if transient {
        if let Some(pending) = conversation.pending.as_mut() {
            if pending.attempt <= max_retries {
                pending.attempt += 1;
                pending.correlation_id =
                    SuggestionRequest::correlation_for(request_id, pending.attempt);
                agent_warn!(
                    "request {} attempt failed ({}); retrying as {}",
                    request_id,
                    reason,
                    pending.correlation_id
                );
                return vec![Effect::RequestAnalysis {
                    conversation_id: conversation_id.to_string(),
                    request_id,
                    correlation_id: pending.correlation_id.clone(),
                    context_window: pending.context_window.clone(),
                }];
            }
        }
    }

    agent_warn!("request {} failed: {}", request_id, reason);
    let Some(request) = finish_request(conversation, RequestStatus::Failed) else {
        return Vec::new();
    };
    resume_deferred(state, conversation_id, request.coalesced, now, policy)
}

fn on_timeout(
    state: &mut AppState,
    conversation_id: &str,
    request_id: RequestId,
    now: u64,
    policy: &dyn TriggerPolicy,
) -> Vec<Effect> {
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        return Vec::new();
    };
    if conversation
        .pending
        .as_ref()
        .map_or(true, |pending| pending.request_id != request_id)
    {
        agent_trace!("timeout for resolved request {} ignored", request_id);
        return Vec::new();
    }
    let Some(request) = finish_request(conversation, RequestStatus::TimedOut) else {
        return Vec::new();
    };
    agent_warn!(
        "request {} timed out after {} attempt(s)",
        request_id,
        request.attempt
    );

    let mut effects = vec![Effect::CancelAnalysis {
        conversation_id: conversation_id.to_string(),
        request_id,
    }];
    effects.extend(resume_deferred(
        state,
        conversation_id,
        request.coalesced,
        now,
        policy,
    ));
    effects
}

/// Destroys the conversation state, cancelling its request and withdrawing its overlay.
fn leave(state: &mut AppState, conversation_id: &str) -> Vec<Effect> {
    let Some(mut conversation) = state.remove_conversation(conversation_id) else {
        return Vec::new();
    };
    let mut effects = Vec::new();
    if let Some(request) = finish_request(&mut conversation, RequestStatus::Cancelled) {
        agent_info!("request {} cancelled; conversation left", request.request_id);
        effects.push(Effect::CancelAnalysis {
            conversation_id: conversation_id.to_string(),
            request_id: request.request_id,
        });
    }
    if conversation.overlay.is_visible() {
        effects.push(Effect::WithdrawSuggestion {
            conversation_id: conversation_id.to_string(),
            reason: DismissReason::ConversationChanged,
        });
    }
    effects
}

fn on_anchor_checked(
    state: &mut AppState,
    conversation_id: &str,
    present: bool,
    now: u64,
) -> Vec<Effect> {
    let grace_ms = state.settings().anchor_grace_ms;
    let Some(conversation) = state.conversation_mut(conversation_id) else {
        return Vec::new();
    };
    let OverlayState::Shown {
        anchor_missing_since,
        ..
    } = &mut conversation.overlay
    else {
        return Vec::new();
    };
    if present {
        *anchor_missing_since = None;
        return Vec::new();
    }
    let since = *anchor_missing_since.get_or_insert(now);
    if now.saturating_sub(since) < grace_ms {
        return Vec::new();
    }
    agent_debug!("composer anchor missing for {} ms; withdrawing", now - since);
    conversation.overlay = OverlayState::Hidden;
    vec![Effect::WithdrawSuggestion {
        conversation_id: conversation_id.to_string(),
        reason: DismissReason::AnchorLost,
    }]
}
