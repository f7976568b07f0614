use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use scraper::Html;

use crate::adapter::compile_selector;
use crate::extract::inside_overlay;
use crate::overlay::{place_above, OverlayError, OverlayFragment};

/// Viewport rectangle of a host element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnchorRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(pub u64);

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount-{}", self.0)
    }
}

/// Read access to the page the agent is embedded in.
pub trait HostPage: Send + Sync {
    fn hostname(&self) -> String;
    fn location_path(&self) -> String;
    /// Serialized document, including any injected overlay subtree.
    fn document_html(&self) -> String;
    /// Rectangle of the first element matching `selector`, if any.
    fn element_rect(&self, selector: &str) -> Option<AnchorRect>;
}

/// The only write access the agent has to the page: its own overlay subtree.
pub trait OverlayHost: Send + Sync {
    fn inject(&self, fragment: &OverlayFragment, anchor: AnchorRect) -> Result<MountId, OverlayError>;
    fn reposition(&self, mount: MountId, anchor: AnchorRect) -> Result<(), OverlayError>;
    fn remove(&self, mount: MountId) -> Result<(), OverlayError>;
}

#[derive(Debug, Clone)]
struct Mounted {
    fragment: OverlayFragment,
    anchor: AnchorRect,
}

#[derive(Debug, Default)]
struct SnapshotInner {
    path: String,
    html: String,
    overlays: BTreeMap<MountId, Mounted>,
    next_mount: u64,
}

/// In-memory page backed by an HTML snapshot.
///
/// Static markup has no layout, so `element_rect` reads an optional
/// `data-rect="x,y,width,height"` attribute and otherwise reports an empty
/// rectangle at the origin.
#[derive(Debug)]
pub struct SnapshotPage {
    hostname: String,
    inner: Mutex<SnapshotInner>,
}

impl SnapshotPage {
    pub fn new(hostname: impl Into<String>, path: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            inner: Mutex::new(SnapshotInner {
                path: path.into(),
                html: html.into(),
                ..SnapshotInner::default()
            }),
        }
    }

    /// Replaces the host markup, as a re-render would. Overlays stay mounted.
    pub fn set_html(&self, html: impl Into<String>) {
        self.lock().html = html.into();
    }

    pub fn set_path(&self, path: impl Into<String>) {
        self.lock().path = path.into();
    }

    /// Host markup without any overlay.
    pub fn host_html(&self) -> String {
        self.lock().html.clone()
    }

    /// Host markup with every mounted overlay inserted before `</body>`.
    pub fn rendered_html(&self) -> String {
        let inner = self.lock();
        if inner.overlays.is_empty() {
            return inner.html.clone();
        }
        let injected: String = inner
            .overlays
            .values()
            .map(|mounted| mounted.fragment.markup(&place_above(mounted.anchor)))
            .collect();
        let split = inner
            .html
            .to_ascii_lowercase()
            .rfind("</body>")
            .unwrap_or(inner.html.len());
        let mut out = String::with_capacity(inner.html.len() + injected.len());
        out.push_str(&inner.html[..split]);
        out.push_str(&injected);
        out.push_str(&inner.html[split..]);
        out
    }

    pub fn overlay_count(&self) -> usize {
        self.lock().overlays.len()
    }

    /// Anchor the overlay was last positioned against.
    pub fn overlay_anchor(&self, mount: MountId) -> Option<AnchorRect> {
        self.lock().overlays.get(&mount).map(|mounted| mounted.anchor)
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostPage for SnapshotPage {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn location_path(&self) -> String {
        self.lock().path.clone()
    }

    fn document_html(&self) -> String {
        self.rendered_html()
    }

    fn element_rect(&self, selector: &str) -> Option<AnchorRect> {
        let sel = compile_selector(selector)?;
        let html = self.host_html();
        let doc = Html::parse_document(&html);
        let el = doc.select(&sel).find(|el| !inside_overlay(el))?;
        Some(
            el.value()
                .attr("data-rect")
                .and_then(parse_rect)
                .unwrap_or_default(),
        )
    }
}

impl OverlayHost for SnapshotPage {
    fn inject(&self, fragment: &OverlayFragment, anchor: AnchorRect) -> Result<MountId, OverlayError> {
        let mut inner = self.lock();
        inner.next_mount += 1;
        let mount = MountId(inner.next_mount);
        inner.overlays.insert(
            mount,
            Mounted {
                fragment: fragment.clone(),
                anchor,
            },
        );
        Ok(mount)
    }

    fn reposition(&self, mount: MountId, anchor: AnchorRect) -> Result<(), OverlayError> {
        let mut inner = self.lock();
        let mounted = inner
            .overlays
            .get_mut(&mount)
            .ok_or(OverlayError::UnknownMount(mount))?;
        mounted.anchor = anchor;
        Ok(())
    }

    fn remove(&self, mount: MountId) -> Result<(), OverlayError> {
        self.lock()
            .overlays
            .remove(&mount)
            .map(|_| ())
            .ok_or(OverlayError::UnknownMount(mount))
    }
}

fn parse_rect(raw: &str) -> Option<AnchorRect> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, width, height] => Some(AnchorRect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => None,
    }
}
