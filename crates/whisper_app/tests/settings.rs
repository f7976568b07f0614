use std::fs;

use pretty_assertions::assert_eq;
use whisper_app::{load_settings, save_settings, AgentSettings};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = load_settings(&dir.path().join("agent.ron"));
    assert_eq!(settings, AgentSettings::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.ron");
    let mut settings = AgentSettings::default();
    settings.debounce_ms = 300;
    settings.endpoint = "http://10.0.0.2:9000/analyze".to_string();
    settings.trigger.keywords = vec!["call me".to_string()];
    settings.trigger.max_retries = 0;

    save_settings(&path, &settings).unwrap();

    assert_eq!(load_settings(&path), settings);
}

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.ron");
    fs::write(&path, "(debounce_ms: 40, trigger: (cooldown_ms: 5000))").unwrap();

    let settings = load_settings(&path);

    assert_eq!(settings.debounce_ms, 40);
    assert_eq!(settings.trigger.cooldown_ms, 5_000);
    assert_eq!(settings.frame_interval_ms, AgentSettings::default().frame_interval_ms);
    assert_eq!(
        settings.trigger.keywords,
        AgentSettings::default().trigger.keywords
    );
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.ron");
    fs::write(&path, "(debounce_ms: \"soon\"").unwrap();

    assert!(AgentSettings::from_ron("(debounce_ms: \"soon\"").is_err());
    assert_eq!(load_settings(&path), AgentSettings::default());
}

#[test]
fn analysis_settings_follow_agent_settings() {
    let mut settings = AgentSettings::default();
    settings.http_timeout_ms = 1_500;
    settings.max_response_bytes = 4_096;

    let analysis = settings.analysis();

    assert_eq!(analysis.endpoint, settings.endpoint);
    assert_eq!(analysis.request_timeout.as_millis(), 1_500);
    assert_eq!(analysis.max_bytes, 4_096);
}
