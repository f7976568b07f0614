use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use whisper_core::{Effect, RequestId};
use whisper_engine::{AnalysisRequest, AnalysisService, OverlayController};
use whisper_logging::{agent_debug, agent_info, agent_warn};

use super::agent::AgentEvent;

/// Executes core effects. Results come back to the agent as [`AgentEvent`]s.
pub struct EffectRunner {
    analysis: Arc<dyn AnalysisService>,
    overlay: OverlayController,
    events: WeakUnboundedSender<AgentEvent>,
    in_flight: HashMap<RequestId, JoinHandle<()>>,
    timers: HashMap<RequestId, JoinHandle<()>>,
}

impl EffectRunner {
    pub fn new(
        analysis: Arc<dyn AnalysisService>,
        overlay: OverlayController,
        events: WeakUnboundedSender<AgentEvent>,
    ) -> Self {
        Self {
            analysis,
            overlay,
            events,
            in_flight: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayController {
        &mut self.overlay
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RequestAnalysis {
                    conversation_id,
                    request_id,
                    correlation_id,
                    context_window,
                } => {
                    agent_info!(
                        "RequestAnalysis request_id={} correlation_id={} messages={}",
                        request_id,
                        correlation_id,
                        context_window.len()
                    );
                    let request = AnalysisRequest {
                        conversation_id: conversation_id.clone(),
                        context_window,
                        correlation_id: correlation_id.clone(),
                    };
                    let analysis = self.analysis.clone();
                    let events = self.events.clone();
                    let handle = tokio::spawn(async move {
                        let result = analysis.analyze(request).await;
                        if let Some(tx) = events.upgrade() {
                            let _ = tx.send(AgentEvent::AnalysisFinished {
                                conversation_id,
                                request_id,
                                correlation_id,
                                result,
                            });
                        }
                    });
                    if let Some(previous) = self.in_flight.insert(request_id, handle) {
                        previous.abort();
                    }
                }
                Effect::ScheduleTimeout {
                    conversation_id,
                    request_id,
                    after_ms,
                } => {
                    let events = self.events.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(after_ms)).await;
                        if let Some(tx) = events.upgrade() {
                            let _ = tx.send(AgentEvent::TimeoutElapsed {
                                conversation_id,
                                request_id,
                            });
                        }
                    });
                    if let Some(previous) = self.timers.insert(request_id, handle) {
                        previous.abort();
                    }
                }
                Effect::CancelAnalysis { request_id, .. } => {
                    agent_debug!("CancelAnalysis request_id={}", request_id);
                    self.abort(request_id);
                }
                Effect::ShowSuggestion {
                    conversation_id,
                    request_id,
                    suggestions,
                } => {
                    if let Err(err) = self.overlay.show(&conversation_id, request_id, suggestions) {
                        agent_warn!("suggestion {} not shown: {}", request_id, err);
                        if let Some(tx) = self.events.upgrade() {
                            let _ = tx.send(AgentEvent::SuggestionNotShown {
                                conversation_id,
                                request_id,
                            });
                        }
                    }
                }
                Effect::WithdrawSuggestion {
                    conversation_id,
                    reason,
                } => {
                    agent_debug!("WithdrawSuggestion reason={:?}", reason);
                    if let Err(err) = self.overlay.withdraw(&conversation_id) {
                        agent_warn!("overlay for {} not removed: {}", conversation_id, err);
                    }
                }
            }
        }
    }

    /// Drops tasks of requests that are no longer pending in the core state.
    pub fn retain_pending(&mut self, pending: &HashSet<RequestId>) {
        let settled: Vec<RequestId> = self
            .in_flight
            .keys()
            .chain(self.timers.keys())
            .filter(|id| !pending.contains(id))
            .copied()
            .collect();
        for request_id in settled {
            self.abort(request_id);
        }
    }

    /// Aborts everything and removes every overlay.
    pub fn shutdown(&mut self) {
        for (_, handle) in self.in_flight.drain().chain(self.timers.drain()) {
            handle.abort();
        }
        self.overlay.withdraw_all();
    }

    fn abort(&mut self, request_id: RequestId) {
        if let Some(handle) = self.in_flight.remove(&request_id) {
            handle.abort();
        }
        if let Some(handle) = self.timers.remove(&request_id) {
            handle.abort();
        }
    }
}
