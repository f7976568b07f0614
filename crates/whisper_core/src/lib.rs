//! Whisper core: pure trigger state machine, policy and introspection views.
mod effect;
mod message;
mod msg;
mod policy;
mod settings;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use message::{ConversationId, Direction, MessageId, MessageOrigin, ObservedMessage, RequestId, Suggestion};
pub use msg::Msg;
pub use policy::{HeuristicPolicy, TriggerContext, TriggerPolicy};
pub use settings::TriggerSettings;
pub use state::{
    AppState, ConversationState, DismissReason, OverlayState, RequestStatus, SeenSet,
    SuggestionRequest, TriggerPhase,
};
pub use update::{update, update_with_policy};
pub use view_model::{AgentView, ConversationView, PendingRequestView};
