use std::sync::Arc;

use pretty_assertions::assert_eq;
use whisper_core::Suggestion;
use whisper_engine::{
    AnchorRect, HostPage, MessageObserver, OverlayController, OverlayError, OverlayHost,
    PlatformConfig, SnapshotPage, OVERLAY_ROOT_ATTR,
};

const HOST_HTML: &str = r#"<html><head><title>Chat</title></head><body>
<ul class="messages"><li class="msg"><p class="body">hello there</p></li></ul>
<div id="composer" data-rect="10,500,320,40" contenteditable="true"></div>
</body></html>"#;

fn suggestions(request_id: u64, texts: &[&str]) -> Vec<Suggestion> {
    texts
        .iter()
        .enumerate()
        .map(|(rank, text)| Suggestion {
            request_id,
            text: text.to_string(),
            rank: rank as u32,
        })
        .collect()
}

fn controller(page: &Arc<SnapshotPage>) -> OverlayController {
    OverlayController::new(page.clone(), page.clone(), "#composer")
}

#[test]
fn overlay_is_anchored_and_removal_restores_host_markup() {
    let page = Arc::new(SnapshotPage::new("chat.example.com", "/c/1", HOST_HTML));
    let mut overlay = controller(&page);

    let mount = overlay
        .show("c1", 1, suggestions(1, &["Ask <why>", "Say sorry"]))
        .unwrap();
    let rendered = page.rendered_html();
    assert!(rendered.contains(OVERLAY_ROOT_ATTR));
    assert!(rendered.contains("Ask &lt;why&gt;"));
    assert!(rendered.contains("left:10px;top:492px;width:320px"));
    assert_eq!(
        page.overlay_anchor(mount),
        Some(AnchorRect {
            x: 10.0,
            y: 500.0,
            width: 320.0,
            height: 40.0
        })
    );
    assert_eq!(page.host_html(), HOST_HTML);

    assert!(overlay.withdraw("c1").unwrap());
    assert_eq!(page.rendered_html(), HOST_HTML);
    assert!(!overlay.withdraw("c1").unwrap());
}

#[test]
fn new_suggestion_replaces_the_previous_bubble() {
    let page = Arc::new(SnapshotPage::new("chat.example.com", "/c/1", HOST_HTML));
    let mut overlay = controller(&page);
    overlay.show("c1", 1, suggestions(1, &["first"])).unwrap();
    overlay.show("c1", 2, suggestions(2, &["second"])).unwrap();

    assert_eq!(page.overlay_count(), 1);
    let rendered = page.rendered_html();
    assert!(rendered.contains("second"));
    assert!(!rendered.contains("first"));
    assert_eq!(overlay.visible_conversations(), vec!["c1".to_string()]);
}

#[test]
fn missing_anchor_is_reported() {
    let page = Arc::new(SnapshotPage::new("chat.example.com", "/c/1", HOST_HTML));
    let mut overlay = controller(&page);
    overlay.show("c1", 1, suggestions(1, &["hi"])).unwrap();
    assert_eq!(overlay.reposition("c1"), Some(true));
    assert_eq!(overlay.reposition("other"), None);

    page.set_html("<html><body><p>settings</p></body></html>");
    assert_eq!(overlay.reposition("c1"), Some(false));
    assert_eq!(
        overlay.show("c2", 2, suggestions(2, &["x"])),
        Err(OverlayError::AnchorMissing)
    );

    overlay.withdraw_all();
    assert_eq!(page.overlay_count(), 0);
    assert_eq!(page.rendered_html(), "<html><body><p>settings</p></body></html>");
}

#[test]
fn injected_overlay_is_never_observed_as_a_message() {
    let config = PlatformConfig {
        platform_id: "testchat".to_string(),
        host_patterns: vec!["chat.example.com".to_string()],
        message_list_selector: "body".to_string(),
        message_item_selector: "li".to_string(),
        sender_selector: ".sender".to_string(),
        timestamp_selector: "time".to_string(),
        text_selector: "p, li".to_string(),
        composer_selector: "#composer".to_string(),
        send_button_selector: "#send".to_string(),
        outgoing_selector: None,
        conversation_selector: None,
        message_id_attribute: None,
    };
    let page = Arc::new(SnapshotPage::new("chat.example.com", "/c/1", HOST_HTML));
    let mut overlay = controller(&page);
    overlay.show("c1", 1, suggestions(1, &["Suggestion text"])).unwrap();

    let observer = MessageObserver::new(&config);
    let scan = observer.scan(&page.document_html());
    let texts: Vec<_> = scan.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["hello there"]);
}

#[test]
fn unknown_mounts_are_rejected() {
    let page = SnapshotPage::new("chat.example.com", "/", HOST_HTML);
    let err = page.remove(whisper_engine::MountId(42)).unwrap_err();
    assert_eq!(err, OverlayError::UnknownMount(whisper_engine::MountId(42)));
    assert_eq!(page.hostname(), "chat.example.com");
    assert_eq!(page.element_rect("#nothing"), None);
}
