use std::collections::BTreeMap;
use std::sync::Arc;

use whisper_core::{ConversationId, RequestId, Suggestion};
use whisper_logging::{agent_debug, agent_warn};

use crate::host::{AnchorRect, HostPage, MountId, OverlayHost};

/// Attribute marking the root of every subtree the agent injects.
pub const OVERLAY_ROOT_ATTR: &str = "data-whisper-overlay";

/// Gap between the bubble and the top edge of the composer.
const ANCHOR_GAP_PX: f64 = 8.0;
const MIN_WIDTH_PX: f64 = 240.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    #[error("composer anchor not found")]
    AnchorMissing,
    #[error("unknown overlay {0}")]
    UnknownMount(MountId),
}

/// Content of one suggestion bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFragment {
    pub conversation_id: ConversationId,
    pub request_id: RequestId,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub left: f64,
    /// Bottom edge of the bubble; the bubble grows upwards from here.
    pub bottom: f64,
    pub width: f64,
}

/// Places the bubble just above the composer, at least `MIN_WIDTH_PX` wide.
pub fn place_above(anchor: AnchorRect) -> Placement {
    Placement {
        left: anchor.x.max(0.0),
        bottom: (anchor.y - ANCHOR_GAP_PX).max(0.0),
        width: anchor.width.max(MIN_WIDTH_PX),
    }
}

impl OverlayFragment {
    /// Self-contained markup; every node lives under the overlay root.
    pub fn markup(&self, placement: &Placement) -> String {
        let items: String = self
            .suggestions
            .iter()
            .map(|s| format!("<li data-rank=\"{}\">{}</li>", s.rank, escape_html(&s.text)))
            .collect();
        format!(
            concat!(
                "<div {attr}=\"{conversation}\" data-request-id=\"{request}\" role=\"dialog\" ",
                "aria-live=\"polite\" style=\"position:fixed;left:{left:.0}px;top:{bottom:.0}px;",
                "width:{width:.0}px;transform:translateY(-100%);z-index:2147483647\">",
                "<ol>{items}</ol>",
                "<button type=\"button\" data-whisper-dismiss aria-label=\"Dismiss\">&times;</button>",
                "</div>"
            ),
            attr = OVERLAY_ROOT_ATTR,
            conversation = escape_html(&self.conversation_id),
            request = self.request_id,
            left = placement.left,
            bottom = placement.bottom,
            width = placement.width,
            items = items,
        )
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Owns the mounted bubble of each conversation and keeps it next to the composer.
pub struct OverlayController {
    host: Arc<dyn OverlayHost>,
    page: Arc<dyn HostPage>,
    composer_selector: String,
    mounted: BTreeMap<ConversationId, MountId>,
}

impl OverlayController {
    pub fn new(host: Arc<dyn OverlayHost>, page: Arc<dyn HostPage>, composer_selector: &str) -> Self {
        Self {
            host,
            page,
            composer_selector: composer_selector.to_string(),
            mounted: BTreeMap::new(),
        }
    }

    pub fn anchor(&self) -> Option<AnchorRect> {
        self.page.element_rect(&self.composer_selector)
    }

    /// Mounts a bubble, replacing any bubble the conversation already has.
    pub fn show(
        &mut self,
        conversation_id: &str,
        request_id: RequestId,
        suggestions: Vec<Suggestion>,
    ) -> Result<MountId, OverlayError> {
        self.withdraw(conversation_id)?;
        let anchor = self.anchor().ok_or(OverlayError::AnchorMissing)?;
        let fragment = OverlayFragment {
            conversation_id: conversation_id.to_string(),
            request_id,
            suggestions,
        };
        let mount = self.host.inject(&fragment, anchor)?;
        agent_debug!("overlay {} shown for request {}", mount, request_id);
        self.mounted.insert(conversation_id.to_string(), mount);
        Ok(mount)
    }

    /// Follows the composer. Returns whether the anchor is present, or `None`
    /// when nothing is mounted for the conversation.
    pub fn reposition(&mut self, conversation_id: &str) -> Option<bool> {
        let mount = *self.mounted.get(conversation_id)?;
        let Some(anchor) = self.anchor() else {
            return Some(false);
        };
        if let Err(err) = self.host.reposition(mount, anchor) {
            agent_warn!("overlay {} could not be repositioned: {}", mount, err);
        }
        Some(true)
    }

    /// Removes the conversation's bubble. Returns whether one was mounted.
    pub fn withdraw(&mut self, conversation_id: &str) -> Result<bool, OverlayError> {
        let Some(mount) = self.mounted.remove(conversation_id) else {
            return Ok(false);
        };
        self.host.remove(mount)?;
        agent_debug!("overlay {} withdrawn", mount);
        Ok(true)
    }

    pub fn withdraw_all(&mut self) {
        let conversations: Vec<_> = self.mounted.keys().cloned().collect();
        for conversation_id in conversations {
            if let Err(err) = self.withdraw(&conversation_id) {
                agent_warn!("overlay for {} not removed: {}", conversation_id, err);
            }
        }
    }

    pub fn visible_conversations(&self) -> Vec<ConversationId> {
        self.mounted.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_html, place_above};
    use crate::host::AnchorRect;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html("<b>\"hi\" & 'bye'</b>"),
            "&lt;b&gt;&quot;hi&quot; &amp; &#39;bye&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn placement_sits_above_anchor_and_clamps() {
        let placement = place_above(AnchorRect {
            x: 20.0,
            y: 600.0,
            width: 100.0,
            height: 40.0,
        });
        assert_eq!(placement.left, 20.0);
        assert_eq!(placement.bottom, 592.0);
        assert_eq!(placement.width, 240.0);

        let top = place_above(AnchorRect::default());
        assert_eq!(top.bottom, 0.0);
    }
}
