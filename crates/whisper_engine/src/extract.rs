use scraper::{ElementRef, Html, Selector};
use whisper_core::Direction;

use crate::adapter::PlatformConfig;
use crate::overlay::OVERLAY_ROOT_ATTR;

/// One message node as found in the page, before identity is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    /// Value of the adapter's message id attribute, when present.
    pub stable_id: Option<String>,
    pub sender: String,
    pub timestamp: String,
    pub text: String,
    pub direction: Direction,
}

/// Per-node extraction failure; the node is skipped and observation continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("item {index}: text selector matched nothing")]
    MissingText { index: usize },
    #[error("item {index}: message text is empty")]
    EmptyText { index: usize },
}

/// Everything one pass over the document found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageScan {
    pub list_present: bool,
    pub composer_present: bool,
    pub conversation_label: Option<String>,
    /// Items in DOM order.
    pub items: Vec<RawItem>,
    pub skipped: Vec<ExtractionError>,
}

/// Applies an adapter's selectors to a document.
///
/// Selectors are compiled once. A selector that does not compile is treated
/// as absent: an unusable list selector falls back to the whole document and
/// an unusable composer selector never reports the conversation as closed.
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    list: Option<Selector>,
    item: Option<Selector>,
    sender: Option<Selector>,
    timestamp: Option<Selector>,
    text: Option<Selector>,
    composer: Option<Selector>,
    outgoing: Option<Selector>,
    conversation: Option<Selector>,
    id_attribute: Option<String>,
}

impl MessageExtractor {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            list: config.compile("messageListSelector"),
            item: config.compile("messageItemSelector"),
            sender: config.compile("senderSelector"),
            timestamp: config.compile("timestampSelector"),
            text: config.compile("textSelector"),
            composer: config.compile("composerSelector"),
            outgoing: config.compile("outgoingSelector"),
            conversation: config.compile("conversationSelector"),
            id_attribute: config
                .message_id_attribute
                .as_deref()
                .map(str::trim)
                .filter(|attr| !attr.is_empty())
                .map(str::to_owned),
        }
    }

    pub fn scan(&self, html: &str) -> PageScan {
        let doc = Html::parse_document(html);
        let list_root = match &self.list {
            Some(sel) => doc.select(sel).find(|el| !inside_overlay(el)),
            None => Some(doc.root_element()),
        };
        let composer_present = self
            .composer
            .as_ref()
            .map_or(true, |sel| doc.select(sel).any(|el| !inside_overlay(&el)));
        let conversation_label = self.conversation.as_ref().and_then(|sel| {
            doc.select(sel)
                .filter(|el| !inside_overlay(el))
                .map(|el| element_text(&el))
                .find(|label| !label.is_empty())
        });

        let mut scan = PageScan {
            list_present: list_root.is_some(),
            composer_present,
            conversation_label,
            ..PageScan::default()
        };
        let (Some(root), Some(item_sel)) = (list_root, self.item.as_ref()) else {
            return scan;
        };

        for (index, node) in root
            .select(item_sel)
            .filter(|el| !inside_overlay(el))
            .enumerate()
        {
            match self.extract_item(index, &node) {
                Ok(item) => scan.items.push(item),
                Err(err) => scan.skipped.push(err),
            }
        }
        scan
    }

    fn extract_item(&self, index: usize, node: &ElementRef<'_>) -> Result<RawItem, ExtractionError> {
        let text = match &self.text {
            Some(sel) => node
                .select(sel)
                .next()
                .map(|el| element_text(&el))
                .ok_or(ExtractionError::MissingText { index })?,
            None => element_text(node),
        };
        if text.is_empty() {
            return Err(ExtractionError::EmptyText { index });
        }

        let sender = self
            .sender
            .as_ref()
            .and_then(|sel| node.select(sel).next())
            .map(|el| element_text(&el))
            .unwrap_or_default();
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(|sel| node.select(sel).next())
            .map(|el| {
                el.value()
                    .attr("datetime")
                    .map(|value| value.trim().to_string())
                    .unwrap_or_else(|| element_text(&el))
            })
            .unwrap_or_default();
        let direction = match &self.outgoing {
            Some(sel) if sel.matches(node) || node.select(sel).next().is_some() => {
                Direction::Outgoing
            }
            _ => Direction::Incoming,
        };
        let stable_id = self
            .id_attribute
            .as_deref()
            .and_then(|attr| node.value().attr(attr))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);

        Ok(RawItem {
            stable_id,
            sender,
            timestamp,
            text,
            direction,
        })
    }
}

/// Text content with whitespace runs collapsed.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// True for the agent's own overlay root and anything beneath it.
pub(crate) fn inside_overlay(el: &ElementRef<'_>) -> bool {
    el.value().attr(OVERLAY_ROOT_ATTR).is_some()
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| ancestor.value().attr(OVERLAY_ROOT_ATTR).is_some())
}

#[cfg(test)]
mod tests {
    use super::element_text;
    use scraper::{Html, Selector};

    #[test]
    fn element_text_collapses_whitespace_across_children() {
        let doc = Html::parse_fragment("<p>  hello <b>there</b>\n  friend </p>");
        let sel = Selector::parse("p").unwrap();
        let p = doc.select(&sel).next().unwrap();
        assert_eq!(element_text(&p), "hello there friend");
    }
}
