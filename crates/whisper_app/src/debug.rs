//! Introspection surface for people writing or fixing platform adapters.
//!
//! Every call is answered by the agent loop from its own state, so results
//! always reflect what the agent sees between two events.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use whisper_core::{AgentView, ObservedMessage};
use whisper_engine::{AdapterHealth, SelectorReport};

use crate::platform::agent::AgentEvent;

/// Read-only snapshot of the whole agent, serialized as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectionReport {
    pub platform_id: String,
    pub adapter_health: AdapterHealth,
    pub order_violations: usize,
    pub active_conversation: Option<String>,
    pub selectors: SelectorReport,
    pub agent: AgentView,
    pub recent_messages: Vec<ObservedMessage>,
    pub visible_overlays: Vec<String>,
}

pub(crate) enum DebugQuery {
    TestSelectors(oneshot::Sender<SelectorReport>),
    LogMessages {
        count: usize,
        reply: oneshot::Sender<Vec<ObservedMessage>>,
    },
    ForceSuggestion {
        text: String,
        reply: oneshot::Sender<ObservedMessage>,
    },
    Report(oneshot::Sender<IntrospectionReport>),
}

/// `test_selectors`, `log_messages` and `force_suggestion`, plus a full report.
///
/// Methods return `None` once the agent has stopped.
#[derive(Clone)]
pub struct DebugInterface {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl DebugInterface {
    pub(crate) fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Whether each selector of the active adapter matches at least one node now.
    pub async fn test_selectors(&self) -> Option<SelectorReport> {
        self.ask(DebugQuery::TestSelectors).await
    }

    /// The last `count` messages of the active conversation, oldest first.
    pub async fn log_messages(&self, count: usize) -> Option<Vec<ObservedMessage>> {
        self.ask(|reply| DebugQuery::LogMessages { count, reply })
            .await
    }

    /// Submits a synthetic incoming message through the regular observation
    /// path. Cooldown and keyword rules are bypassed; the single-request,
    /// timeout and retry rules are not.
    pub async fn force_suggestion(&self, text: impl Into<String>) -> Option<ObservedMessage> {
        let text = text.into();
        self.ask(|reply| DebugQuery::ForceSuggestion { text, reply })
            .await
    }

    pub async fn report(&self) -> Option<IntrospectionReport> {
        self.ask(DebugQuery::Report).await
    }

    async fn ask<T>(&self, query: impl FnOnce(oneshot::Sender<T>) -> DebugQuery) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AgentEvent::Debug(query(reply))).ok()?;
        rx.await.ok()
    }
}
