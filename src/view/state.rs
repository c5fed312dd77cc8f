use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bridge::{ContainerSize, DisplayOption, DisplayToggles, PageMargins};
use crate::consts::{DEFAULT_ZOOM, RESIZE_DEBOUNCE, RESIZE_THRESHOLD, SETTLE_DELAY};
use crate::error::BridgeError;

/// Timing knobs for the view. None of the durations are load-bearing.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Quiet period before a container size is forwarded.
    pub resize_debounce: Duration,
    /// Size deltas at or below this are not forwarded.
    pub resize_threshold: f64,
    /// Yield after readiness before re-applying state.
    pub settle_delay: Duration,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            resize_debounce: RESIZE_DEBOUNCE,
            resize_threshold: RESIZE_THRESHOLD,
            settle_delay: SETTLE_DELAY,
        }
    }
}

/// External declarative state the view mirrors into the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewProps {
    #[serde(skip)]
    pub content: String,
    pub transpose: i32,
    pub zoom: f64,
    #[serde(skip)]
    pub size: Option<ContainerSize>,
    pub display: DisplayToggles,
    pub margins: PageMargins,
}

impl Default for ViewProps {
    fn default() -> Self {
        Self {
            content: String::new(),
            transpose: 0,
            zoom: DEFAULT_ZOOM,
            size: None,
            display: DisplayToggles::default(),
            margins: PageMargins::default(),
        }
    }
}

/// Where the view is in getting its content on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPhase {
    /// No content has been provided.
    Idle,
    /// Content is waiting for the engine to become ready.
    Requested,
    Loading,
    Loaded,
    /// The last load failed. Only a content change retries.
    Failed(BridgeError),
}

/// Last values pushed to the engine. `None` means "never applied", which
/// always compares unequal and so forces the next apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewDisplayState {
    /// SHA-256 of the loaded content, hex-encoded.
    pub content: Option<String>,
    pub transpose: Option<i32>,
    pub zoom: Option<f64>,
    pub size: Option<ContainerSize>,
    pub display: BTreeMap<DisplayOption, bool>,
    pub margins: Option<PageMargins>,
}

impl ViewDisplayState {
    /// After a load the engine is back at default zoom and transposition.
    pub(crate) fn reset_derived(&mut self) {
        self.zoom = Some(DEFAULT_ZOOM);
        self.transpose = Some(0);
    }
}

pub fn content_digest(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
