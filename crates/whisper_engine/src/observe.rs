use std::collections::{HashMap, HashSet};

use whisper_core::{ConversationId, MessageOrigin, ObservedMessage};
use whisper_logging::{agent_debug, agent_trace, agent_warn};

use crate::adapter::PlatformConfig;
use crate::extract::{MessageExtractor, PageScan, RawItem};
use crate::fingerprint::{message_fingerprint, stable_message_id};
use crate::timestamp::is_order_violation;

/// Result of feeding one mutation batch through the observer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    /// Finalised messages in DOM order.
    pub messages: Vec<ObservedMessage>,
    /// Items whose text is still changing; a follow-up batch is needed.
    pub unstable: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    text: String,
    first_seen_at: u64,
    stable: bool,
    emitted: bool,
}

/// Turns page scans into a stabilised message stream for one adapter.
///
/// The observer keeps one slot per visible message id. A message is emitted
/// once its id and text were present in two consecutive batches, which keeps
/// partially rendered or streaming messages out of the stream. Fingerprinted
/// ids change with the text, so a growing message never settles early.
/// Each slot is emitted at most once while it stays on screen; a message that
/// scrolls out and back is emitted again and left to the conversation's seen
/// set.
#[derive(Debug, Clone)]
pub struct MessageObserver {
    platform_id: String,
    extractor: MessageExtractor,
    slots: HashMap<String, Slot>,
    order_violations: usize,
}

impl MessageObserver {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            platform_id: config.platform_id.clone(),
            extractor: MessageExtractor::new(config),
            slots: HashMap::new(),
            order_violations: 0,
        }
    }

    pub fn scan(&self, html: &str) -> PageScan {
        let scan = self.extractor.scan(html);
        for err in &scan.skipped {
            agent_warn!("skipping message node: {}", err);
        }
        scan
    }

    /// `{platform}:{label}` from the conversation selector, else `{platform}:{path}`.
    pub fn conversation_key(&self, scan: &PageScan, location_path: &str) -> ConversationId {
        match &scan.conversation_label {
            Some(label) => format!("{}:{}", self.platform_id, label),
            None => {
                let path = location_path.trim();
                let path = if path.is_empty() { "/" } else { path };
                format!("{}:{}", self.platform_id, path)
            }
        }
    }

    /// Messages already on screen when a conversation opens. All items count
    /// as final and become the baseline for stabilisation.
    pub fn prime(
        &mut self,
        scan: &PageScan,
        conversation_id: &str,
        now: u64,
    ) -> Vec<ObservedMessage> {
        self.slots.clear();
        self.check_order(scan);
        let mut messages = Vec::with_capacity(scan.items.len());
        for (message_id, item) in self.identify(scan) {
            self.slots.insert(
                message_id.clone(),
                Slot {
                    text: item.text.clone(),
                    first_seen_at: now,
                    stable: true,
                    emitted: true,
                },
            );
            messages.push(to_message(conversation_id, message_id, item, now));
        }
        agent_debug!("primed {} existing message(s)", messages.len());
        messages
    }

    /// Applies one batch. Emission stops at the first item that is not yet
    /// stable so the stream never skips ahead of DOM order.
    pub fn observe(&mut self, scan: &PageScan, conversation_id: &str, now: u64) -> Observation {
        self.check_order(scan);
        let mut slots = HashMap::with_capacity(scan.items.len());
        let mut observation = Observation::default();
        let mut blocked = false;

        for (message_id, item) in self.identify(scan) {
            let mut slot = match self.slots.remove(&message_id) {
                Some(previous) if previous.text == item.text => Slot {
                    stable: true,
                    ..previous
                },
                _ => Slot {
                    text: item.text.clone(),
                    first_seen_at: now,
                    stable: false,
                    emitted: false,
                },
            };
            if !slot.stable {
                observation.unstable += 1;
                blocked = true;
            } else if !slot.emitted && !blocked {
                observation.messages.push(to_message(
                    conversation_id,
                    message_id.clone(),
                    item,
                    slot.first_seen_at,
                ));
                slot.emitted = true;
            }
            slots.insert(message_id, slot);
        }
        self.slots = slots;

        if observation.unstable > 0 {
            agent_trace!("{} message(s) still settling", observation.unstable);
        }
        observation
    }

    /// Forgets all slots, e.g. after a conversation switch.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Number of batches in which timestamps decreased in DOM order.
    pub fn order_violations(&self) -> usize {
        self.order_violations
    }

    fn check_order(&mut self, scan: &PageScan) {
        let mut previous: Option<&str> = None;
        for item in scan.items.iter().filter(|item| !item.timestamp.is_empty()) {
            if let Some(prev) = previous {
                if is_order_violation(prev, &item.timestamp) {
                    self.order_violations += 1;
                    agent_warn!(
                        "adapter {}: timestamp {} follows {} in DOM order",
                        self.platform_id,
                        item.timestamp,
                        prev
                    );
                    return;
                }
            }
            previous = Some(&item.timestamp);
        }
    }

    /// Message id for every item, in DOM order. Duplicate ids keep the first item.
    fn identify<'a>(&self, scan: &'a PageScan) -> Vec<(String, &'a RawItem)> {
        let mut ordinals: HashMap<(&str, &str, &str), usize> = HashMap::new();
        let mut ids = HashSet::new();
        scan.items
            .iter()
            .map(|item| {
                let ordinal = bump(
                    &mut ordinals,
                    (
                        item.sender.as_str(),
                        item.timestamp.as_str(),
                        item.text.as_str(),
                    ),
                );
                let id = match &item.stable_id {
                    Some(raw) => stable_message_id(&self.platform_id, raw),
                    None => message_fingerprint(&item.sender, &item.timestamp, &item.text, ordinal),
                };
                (id, item)
            })
            .filter(|(id, _)| ids.insert(id.clone()))
            .collect()
    }
}

fn bump<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, usize>, key: K) -> usize {
    let count = counts.entry(key).or_insert(0);
    let ordinal = *count;
    *count += 1;
    ordinal
}

fn to_message(
    conversation_id: &str,
    message_id: String,
    item: &RawItem,
    first_seen_at: u64,
) -> ObservedMessage {
    ObservedMessage {
        conversation_id: conversation_id.to_string(),
        message_id,
        sender: item.sender.clone(),
        direction: item.direction,
        text: item.text.clone(),
        timestamp: item.timestamp.clone(),
        first_seen_at,
        origin: MessageOrigin::Dom,
    }
}
