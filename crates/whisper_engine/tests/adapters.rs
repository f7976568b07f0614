use pretty_assertions::assert_eq;
use whisper_engine::{AdapterHealth, AdapterRegistry, RegistryError, Resolution};

fn platform(resolution: Resolution<'_>) -> Option<&str> {
    match resolution {
        Resolution::Supported(adapter) => Some(adapter.config.platform_id.as_str()),
        Resolution::NotSupported => None,
    }
}

#[test]
fn builtin_adapters_cover_supported_platforms() {
    let registry = AdapterRegistry::builtin();
    assert_eq!(registry.adapters().len(), 6);
    assert!(registry.adapters().iter().all(|a| !a.health.is_degraded()));

    let cases = [
        ("web.whatsapp.com", Some("whatsapp")),
        ("www.messenger.com", Some("messenger")),
        ("acme.slack.com", Some("slack")),
        ("app.slack.com", Some("slack")),
        ("discord.com", Some("discord")),
        ("canary.discord.com", Some("discord")),
        ("web.telegram.org", Some("telegram")),
        ("www.linkedin.com", Some("linkedin")),
        ("example.com", None),
        ("notslack.com", None),
    ];
    for (host, expected) in cases {
        assert_eq!(platform(registry.resolve(host)), expected, "host {host}");
    }
}

#[test]
fn resolution_ignores_case_port_and_trailing_dot() {
    let registry = AdapterRegistry::builtin();
    assert_eq!(platform(registry.resolve("WEB.WhatsApp.com.")), Some("whatsapp"));
    assert_eq!(platform(registry.resolve("web.whatsapp.com:443")), Some("whatsapp"));
    assert_eq!(
        platform(registry.resolve_url("https://app.slack.com/client/T1/C2")),
        Some("slack")
    );
    assert_eq!(platform(registry.resolve_url("not a url")), None);
}

#[test]
fn first_matching_adapter_wins() {
    let json = r##"{"adapters": [
        {"platformId": "first", "hostPatterns": ["*chat*"],
         "messageListSelector": "ul", "messageItemSelector": "li", "senderSelector": "b",
         "timestampSelector": "time", "textSelector": "p", "composerSelector": "#c",
         "sendButtonSelector": "#s"},
        {"platformId": "second", "hostPatterns": ["chat.example.com"],
         "messageListSelector": "ul", "messageItemSelector": "li", "senderSelector": "b",
         "timestampSelector": "time", "textSelector": "p", "composerSelector": "#c",
         "sendButtonSelector": "#s"}
    ]}"##;
    let registry = AdapterRegistry::from_json(json).unwrap();
    assert_eq!(platform(registry.resolve("chat.example.com")), Some("first"));
}

#[test]
fn bad_selectors_degrade_only_that_adapter() {
    let json = r##"{"adapters": [
        {"platformId": "broken", "hostPatterns": ["broken.example.com"],
         "messageListSelector": "ul[[", "messageItemSelector": "", "senderSelector": "b",
         "timestampSelector": "time", "textSelector": "p", "composerSelector": "#c",
         "sendButtonSelector": "#s"},
        {"platformId": "fine", "hostPatterns": ["fine.example.com"],
         "messageListSelector": "ul", "messageItemSelector": "li", "senderSelector": "b",
         "timestampSelector": "time", "textSelector": "p", "composerSelector": "#c",
         "sendButtonSelector": "#s"}
    ]}"##;
    let registry = AdapterRegistry::from_json(json).unwrap();
    assert_eq!(registry.adapters().len(), 2);

    let Resolution::Supported(broken) = registry.resolve("broken.example.com") else {
        panic!("broken adapter should still resolve");
    };
    match &broken.health {
        AdapterHealth::Degraded { reasons } => {
            assert_eq!(reasons.len(), 2);
            assert!(reasons[0].starts_with("messageListSelector"));
            assert!(reasons[1].starts_with("messageItemSelector"));
        }
        AdapterHealth::Healthy => panic!("expected degraded adapter"),
    }

    let Resolution::Supported(fine) = registry.resolve("fine.example.com") else {
        panic!("fine adapter should resolve");
    };
    assert_eq!(fine.health, AdapterHealth::Healthy);
}

#[test]
fn malformed_document_is_a_load_error() {
    let err = AdapterRegistry::from_json("{ not json").unwrap_err();
    assert!(matches!(err, RegistryError::Parse(_)));

    let missing_field = r#"{"adapters": [{"platformId": "x"}]}"#;
    assert!(AdapterRegistry::from_json(missing_field).is_err());
}

#[test]
fn degradation_reasons_accumulate_without_duplicates() {
    let mut health = AdapterHealth::Healthy;
    health.degrade("order violation");
    health.degrade("order violation");
    health.degrade("timestampSelector unresolved");
    assert_eq!(
        health,
        AdapterHealth::Degraded {
            reasons: vec![
                "order violation".to_string(),
                "timestampSelector unresolved".to_string()
            ]
        }
    );
}
