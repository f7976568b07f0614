//! Whisper agent runtime: the event loop that ties page observation, the
//! trigger core and the overlay together, plus the introspection surface.
pub mod cli;
pub mod debug;
pub mod platform;

pub use debug::{DebugInterface, IntrospectionReport};
pub use platform::agent::{Agent, AgentHandle};
pub use platform::logging::{LogDestination, DEFAULT_LOG_FILE};
pub use platform::settings::{load_settings, save_settings, AgentSettings, SettingsError};
