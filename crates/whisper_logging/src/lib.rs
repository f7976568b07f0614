#![deny(missing_docs)]
//! Shared logging utilities for the whisper agent workspace.
//!
//! This crate provides the `agent_*` logging macros used across the codebase,
//! a thread-local label for the conversation currently being processed, and a
//! minimal test initializer for the global logger.

use std::cell::RefCell;

thread_local! {
    /// Conversation the current thread is processing events for.
    static ACTIVE_CONVERSATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Records the conversation the runtime is currently processing on this thread.
/// Pass `None` once the conversation is left.
///
/// The label is per thread. On a multi-threaded runtime a task can resume on
/// another worker after an `.await`, so it must set the label again before
/// logging from each wakeup.
pub fn set_active_conversation(conversation_id: Option<&str>) {
    ACTIVE_CONVERSATION.with(|v| *v.borrow_mut() = conversation_id.map(str::to_owned));
}

/// Returns the conversation label for the current thread, or `"-"` when unset.
pub fn active_conversation() -> String {
    ACTIVE_CONVERSATION.with(|v| v.borrow().clone().unwrap_or_else(|| "-".to_string()))
}

/// Logs a trace-level message tagged with the active conversation.
#[macro_export]
macro_rules! agent_trace {
    ($($arg:tt)*) => {{
        log::trace!("[{}] {}", $crate::active_conversation(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the active conversation.
#[macro_export]
macro_rules! agent_debug {
    ($($arg:tt)*) => {{
        log::debug!("[{}] {}", $crate::active_conversation(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the active conversation.
#[macro_export]
macro_rules! agent_info {
    ($($arg:tt)*) => {{
        log::info!("[{}] {}", $crate::active_conversation(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the active conversation.
#[macro_export]
macro_rules! agent_warn {
    ($($arg:tt)*) => {{
        log::warn!("[{}] {}", $crate::active_conversation(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the active conversation.
#[macro_export]
macro_rules! agent_error {
    ($($arg:tt)*) => {{
        log::error!("[{}] {}", $crate::active_conversation(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::{active_conversation, set_active_conversation};

    #[test]
    fn active_conversation_defaults_to_dash_and_can_be_cleared() {
        assert_eq!(active_conversation(), "-");
        set_active_conversation(Some("web.whatsapp.com/alice"));
        assert_eq!(active_conversation(), "web.whatsapp.com/alice");
        set_active_conversation(None);
        assert_eq!(active_conversation(), "-");
    }

    #[test]
    fn label_is_not_shared_between_threads() {
        set_active_conversation(Some("app.slack.com:general"));
        let other = std::thread::spawn(active_conversation).join().unwrap();
        assert_eq!(other, "-");
        assert_eq!(active_conversation(), "app.slack.com:general");
        set_active_conversation(None);
    }
}
