use scraper::Html;
use serde::Serialize;

use crate::adapter::{compile_selector, PlatformConfig, SELECTOR_FIELDS};
use crate::extract::inside_overlay;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorProbe {
    pub field: String,
    pub selector: String,
    /// False when the selector is empty or does not parse.
    pub valid: bool,
    pub match_count: usize,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorReport {
    pub platform_id: String,
    pub probes: Vec<SelectorProbe>,
}

impl SelectorReport {
    pub fn probe(&self, field: &str) -> Option<&SelectorProbe> {
        self.probes.iter().find(|probe| probe.field == field)
    }

    pub fn unresolved(&self) -> Vec<&str> {
        self.probes
            .iter()
            .filter(|probe| !probe.resolved)
            .map(|probe| probe.field.as_str())
            .collect()
    }
}

/// Checks every selector of `config` against the document as it is now.
/// Nodes inside the agent's overlay are not counted.
pub fn test_selectors(config: &PlatformConfig, html: &str) -> SelectorReport {
    let doc = Html::parse_document(html);
    let optional = ["outgoingSelector", "conversationSelector"];
    let probes = SELECTOR_FIELDS
        .iter()
        .chain(optional.iter())
        .filter_map(|field| {
            let raw = config.selector(field)?;
            let match_count = compile_selector(raw).map(|sel| {
                doc.select(&sel).filter(|el| !inside_overlay(el)).count()
            });
            Some(SelectorProbe {
                field: (*field).to_string(),
                selector: raw.to_string(),
                valid: match_count.is_some(),
                match_count: match_count.unwrap_or(0),
                resolved: match_count.is_some_and(|count| count > 0),
            })
        })
        .collect();
    SelectorReport {
        platform_id: config.platform_id.clone(),
        probes,
    }
}
