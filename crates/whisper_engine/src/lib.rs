//! Whisper engine: the page-facing side of the agent.
//!
//! Adapter lookup, DOM extraction and stabilisation, the analysis client and
//! the overlay surface. Decisions live in `whisper_core`.
mod adapter;
mod analysis;
mod extract;
mod fingerprint;
mod host;
mod observe;
mod overlay;
mod probe;
mod timestamp;
mod types;

pub use adapter::{
    normalize_host, AdapterHealth, AdapterRegistry, HostPattern, LoadedAdapter, PlatformConfig,
    RegistryError, Resolution, SELECTOR_FIELDS,
};
pub use analysis::{
    AnalysisRequest, AnalysisResponse, AnalysisService, AnalysisSettings, ReqwestAnalysisClient,
};
pub use extract::{ExtractionError, MessageExtractor, PageScan, RawItem};
pub use fingerprint::{message_fingerprint, stable_message_id};
pub use host::{AnchorRect, HostPage, MountId, OverlayHost, SnapshotPage};
pub use observe::{MessageObserver, Observation};
pub use overlay::{
    escape_html, place_above, OverlayController, OverlayError, OverlayFragment, Placement,
    OVERLAY_ROOT_ATTR,
};
pub use probe::{test_selectors, SelectorProbe, SelectorReport};
pub use timestamp::{is_order_violation, parse_timestamp, ParsedTimestamp};
pub use types::{AnalysisError, FailureKind};
