use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use whisper_core::{
    update_with_policy, AppState, ConversationId, Direction, HeuristicPolicy, MessageOrigin, Msg,
    ObservedMessage, RequestId, TriggerPolicy,
};
use whisper_engine::{
    test_selectors, AdapterRegistry, AnalysisError, AnalysisResponse, AnalysisService,
    HostPage, LoadedAdapter, MessageObserver, OverlayController, OverlayHost, Resolution,
};
use whisper_logging::{agent_debug, agent_info, set_active_conversation};

use super::effects::EffectRunner;
use super::settings::AgentSettings;
use crate::debug::{DebugInterface, DebugQuery, IntrospectionReport};

/// Messages shown in an introspection report.
const REPORT_MESSAGES: usize = 20;

pub(crate) enum AgentEvent {
    Mutations,
    Flush(oneshot::Sender<()>),
    Dismiss,
    Unload,
    AnalysisFinished {
        conversation_id: ConversationId,
        request_id: RequestId,
        correlation_id: String,
        result: Result<AnalysisResponse, AnalysisError>,
    },
    TimeoutElapsed {
        conversation_id: ConversationId,
        request_id: RequestId,
    },
    SuggestionNotShown {
        conversation_id: ConversationId,
        request_id: RequestId,
    },
    Debug(DebugQuery),
}

/// Milliseconds since attach, on tokio's clock so paused-time tests stay exact.
#[derive(Debug, Clone, Copy)]
struct AgentClock {
    start: Instant,
}

impl AgentClock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Cheap handle the host bridge uses to talk to a running [`Agent`].
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl AgentHandle {
    /// The message list changed. Bursts are coalesced by the debounce window.
    pub fn notify_mutations(&self) {
        let _ = self.tx.send(AgentEvent::Mutations);
    }

    /// Processes any pending batch immediately and waits until it is done.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AgentEvent::Flush(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    /// The user closed the suggestion bubble of the active conversation.
    pub fn dismiss_suggestion(&self) {
        let _ = self.tx.send(AgentEvent::Dismiss);
    }

    /// Cancels all work, removes the overlay and stops the agent loop.
    pub fn page_unloaded(&self) {
        let _ = self.tx.send(AgentEvent::Unload);
    }

    pub fn debug(&self) -> DebugInterface {
        DebugInterface::new(self.tx.clone())
    }
}

/// The agent embedded in one host page.
///
/// Owns the conversation state and drives it from a single task: mutation
/// batches, analysis results, timers and animation frames are all handled in
/// order on [`Agent::run`].
pub struct Agent {
    page: Arc<dyn HostPage>,
    adapter: LoadedAdapter,
    observer: MessageObserver,
    state: AppState,
    policy: Box<dyn TriggerPolicy + Send>,
    runner: EffectRunner,
    rx: mpsc::UnboundedReceiver<AgentEvent>,
    settings: AgentSettings,
    clock: AgentClock,
    active: Option<ConversationId>,
    batch_due: Option<Instant>,
    synthetic_seq: u64,
}

impl Agent {
    /// Resolves the page's adapter. Unsupported hosts get no agent at all.
    pub fn attach(
        page: Arc<dyn HostPage>,
        overlay_host: Arc<dyn OverlayHost>,
        registry: &AdapterRegistry,
        settings: AgentSettings,
        analysis: Arc<dyn AnalysisService>,
    ) -> Option<(Agent, AgentHandle)> {
        let adapter = match registry.resolve(&page.hostname()) {
            Resolution::Supported(adapter) => adapter.clone(),
            Resolution::NotSupported => return None,
        };
        agent_info!(
            "attaching {} adapter to {}",
            adapter.config.platform_id,
            page.hostname()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let overlay = OverlayController::new(
            overlay_host,
            page.clone(),
            &adapter.config.composer_selector,
        );
        let runner = EffectRunner::new(analysis, overlay, tx.downgrade());
        let policy = Box::new(HeuristicPolicy::from_settings(&settings.trigger));
        let agent = Agent {
            observer: MessageObserver::new(&adapter.config),
            state: AppState::with_settings(settings.trigger.clone()),
            page,
            adapter,
            policy,
            runner,
            rx,
            settings,
            clock: AgentClock::new(),
            active: None,
            batch_due: None,
            synthetic_seq: 0,
        };
        Some((agent, AgentHandle { tx }))
    }

    /// Replaces the default heuristic trigger policy.
    pub fn with_policy(mut self, policy: Box<dyn TriggerPolicy + Send>) -> Self {
        self.policy = policy;
        self
    }

    /// Runs until the page unloads or every handle is dropped.
    pub async fn run(mut self) {
        self.process_batch();

        let mut frames = interval(self.settings.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let batch_due = self.batch_due;
            let tracking = self.overlay_visible();
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    set_active_conversation(self.active.as_deref());
                    if !self.handle_event(event) {
                        break;
                    }
                }
                _ = wait_until(batch_due) => {
                    set_active_conversation(self.active.as_deref());
                    self.batch_due = None;
                    self.process_batch();
                }
                _ = frames.tick(), if tracking => {
                    set_active_conversation(self.active.as_deref());
                    self.check_anchors();
                }
            }
        }

        self.shutdown();
    }

    fn handle_event(&mut self, event: AgentEvent) -> bool {
        match event {
            AgentEvent::Mutations => {
                if self.batch_due.is_none() {
                    self.batch_due = Some(Instant::now() + self.settings.debounce());
                }
            }
            AgentEvent::Flush(reply) => {
                self.batch_due = None;
                self.process_batch();
                let _ = reply.send(());
            }
            AgentEvent::Dismiss => {
                if let Some(conversation_id) = self.active.clone() {
                    self.dispatch(Msg::SuggestionDismissed { conversation_id });
                }
            }
            AgentEvent::Unload => return false,
            AgentEvent::AnalysisFinished {
                conversation_id,
                request_id,
                correlation_id,
                result,
            } => {
                let now = self.clock.now_ms();
                let msg = match result {
                    Ok(response) => Msg::AnalysisSucceeded {
                        conversation_id,
                        request_id,
                        correlation_id,
                        suggestions: response.suggestions,
                        now,
                    },
                    Err(err) => Msg::AnalysisFailed {
                        conversation_id,
                        request_id,
                        correlation_id,
                        transient: err.is_transient(),
                        reason: err.to_string(),
                        now,
                    },
                };
                self.dispatch(msg);
            }
            AgentEvent::TimeoutElapsed {
                conversation_id,
                request_id,
            } => {
                let now = self.clock.now_ms();
                self.dispatch(Msg::RequestTimedOut {
                    conversation_id,
                    request_id,
                    now,
                });
            }
            AgentEvent::SuggestionNotShown {
                conversation_id,
                request_id,
            } => self.dispatch(Msg::SuggestionNotShown {
                conversation_id,
                request_id,
            }),
            AgentEvent::Debug(query) => self.answer(query),
        }
        true
    }

    /// One observation pass: conversation detection, then new final messages.
    fn process_batch(&mut self) {
        let now = self.clock.now_ms();
        let scan = self.observer.scan(&self.page.document_html());

        if !scan.composer_present {
            if let Some(previous) = self.active.take() {
                agent_info!("composer gone; leaving {}", previous);
                self.observer.reset();
                self.dispatch(Msg::ConversationLeft {
                    conversation_id: previous,
                });
                set_active_conversation(None);
            }
            return;
        }

        let conversation_id = self
            .observer
            .conversation_key(&scan, &self.page.location_path());
        if self.active.as_deref() != Some(conversation_id.as_str()) {
            if let Some(previous) = self.active.take() {
                agent_info!("switched from {} to {}", previous, conversation_id);
                self.dispatch(Msg::ConversationLeft {
                    conversation_id: previous,
                });
            }
            set_active_conversation(Some(conversation_id.as_str()));
            let existing = self.observer.prime(&scan, &conversation_id, now);
            self.active = Some(conversation_id.clone());
            self.dispatch(Msg::ConversationOpened {
                conversation_id,
                existing,
            });
            return;
        }

        let observation = self.observer.observe(&scan, &conversation_id, now);
        let conversation = self.state.conversation(&conversation_id);
        let fresh: Vec<ObservedMessage> = observation
            .messages
            .into_iter()
            .filter(|m| !conversation.is_some_and(|c| c.has_seen(&m.message_id)))
            .collect();
        if !fresh.is_empty() {
            agent_debug!("{} new message(s)", fresh.len());
            self.dispatch(Msg::MessagesObserved {
                conversation_id,
                messages: fresh,
                now,
            });
        }
        if observation.unstable > 0 && self.batch_due.is_none() {
            self.batch_due = Some(Instant::now() + self.settings.debounce());
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update_with_policy(state, msg, self.policy.as_ref());
        self.state = state;
        self.runner.enqueue(effects);
        self.runner.retain_pending(&self.pending_requests());
    }

    fn pending_requests(&self) -> HashSet<RequestId> {
        self.state
            .view()
            .conversations
            .iter()
            .filter_map(|c| c.pending_request.as_ref().map(|p| p.request_id))
            .collect()
    }

    fn overlay_visible(&self) -> bool {
        self.state
            .view()
            .conversations
            .iter()
            .any(|c| c.overlay_visible)
    }

    /// Animation-frame step: follow the composer and report whether it exists.
    fn check_anchors(&mut self) {
        let now = self.clock.now_ms();
        let visible: Vec<ConversationId> = self
            .state
            .view()
            .conversations
            .into_iter()
            .filter(|c| c.overlay_visible)
            .map(|c| c.conversation_id)
            .collect();
        for conversation_id in visible {
            // A bubble that is not mounted counts as a missing anchor.
            let present = self
                .runner
                .overlay_mut()
                .reposition(&conversation_id)
                .unwrap_or(false);
            self.dispatch(Msg::AnchorChecked {
                conversation_id,
                present,
                now,
            });
        }
    }

    fn answer(&mut self, query: DebugQuery) {
        match query {
            DebugQuery::TestSelectors(reply) => {
                let _ = reply.send(test_selectors(
                    &self.adapter.config,
                    &self.page.document_html(),
                ));
            }
            DebugQuery::LogMessages { count, reply } => {
                let _ = reply.send(self.recent_messages(count));
            }
            DebugQuery::ForceSuggestion { text, reply } => {
                let message = self.synthesize(text);
                let now = self.clock.now_ms();
                self.dispatch(Msg::SuggestionForced {
                    message: message.clone(),
                    now,
                });
                let _ = reply.send(message);
            }
            DebugQuery::Report(reply) => {
                let _ = reply.send(self.report());
            }
        }
    }

    fn recent_messages(&self, count: usize) -> Vec<ObservedMessage> {
        self.active
            .as_deref()
            .and_then(|id| self.state.conversation(id))
            .map(|c| c.recent_messages(count))
            .unwrap_or_default()
    }

    fn synthesize(&mut self, text: String) -> ObservedMessage {
        self.synthetic_seq += 1;
        let conversation_id = match &self.active {
            Some(active) => active.clone(),
            None => {
                let scan = self.observer.scan(&self.page.document_html());
                self.observer
                    .conversation_key(&scan, &self.page.location_path())
            }
        };
        ObservedMessage {
            conversation_id,
            message_id: format!("synthetic-{}", self.synthetic_seq),
            sender: String::new(),
            direction: Direction::Incoming,
            text,
            timestamp: Utc::now().to_rfc3339(),
            first_seen_at: self.clock.now_ms(),
            origin: MessageOrigin::Synthetic,
        }
    }

    fn report(&self) -> IntrospectionReport {
        let mut adapter_health = self.adapter.health.clone();
        if self.observer.order_violations() > 0 {
            adapter_health.degrade("timestamps decrease in DOM order");
        }
        IntrospectionReport {
            platform_id: self.adapter.config.platform_id.clone(),
            adapter_health,
            order_violations: self.observer.order_violations(),
            active_conversation: self.active.clone(),
            selectors: test_selectors(&self.adapter.config, &self.page.document_html()),
            agent: self.state.view(),
            recent_messages: self.recent_messages(REPORT_MESSAGES),
            visible_overlays: self.runner.overlay().visible_conversations(),
        }
    }

    fn shutdown(&mut self) {
        self.dispatch(Msg::PageUnloaded);
        self.runner.shutdown();
        self.active = None;
        set_active_conversation(None);
        agent_info!("agent stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
