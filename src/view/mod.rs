//! Reactive binding from declarative view state to bridge calls.
//!
//! [`ScoreView::update`] is called on every re-evaluation of the external
//! state. Only values that differ from what was last applied reach the
//! engine, nothing is sent before readiness, and container resizes are
//! debounced.

mod state;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;

use crate::bridge::{Bridge, ContainerSize, DisplayOption, PageMargins};
use crate::error::BridgeError;
use crate::events::Event;

pub use state::{LoadPhase, ViewConfig, ViewDisplayState, ViewProps, content_digest};

type ErrorListener = Arc<dyn Fn(&BridgeError) + Send + Sync>;

/// Mirrors [`ViewProps`] into the engine through a [`Bridge`].
///
/// Takes over the bridge's ready listener: on readiness every gate is
/// opened once and the current props are re-applied in full.
pub struct ScoreView {
    bridge: Arc<Bridge>,
    config: ViewConfig,
    props: Mutex<ViewProps>,
    applied: Mutex<ViewDisplayState>,
    phase: Mutex<LoadPhase>,
    resize_generation: AtomicU64,
    /// Set once a sync has run against a ready engine. Guarded by `serial`.
    synced_since_ready: AtomicBool,
    serial: tokio::sync::Mutex<()>,
    on_error: Mutex<Option<ErrorListener>>,
}

impl ScoreView {
    pub fn new(bridge: Arc<Bridge>, config: ViewConfig) -> Arc<Self> {
        let view = Arc::new(Self {
            bridge: Arc::clone(&bridge),
            config,
            props: Mutex::new(ViewProps::default()),
            applied: Mutex::new(ViewDisplayState::default()),
            phase: Mutex::new(LoadPhase::Idle),
            resize_generation: AtomicU64::new(0),
            synced_since_ready: AtomicBool::new(false),
            serial: tokio::sync::Mutex::new(()),
            on_error: Mutex::new(None),
        });

        let weak = Arc::downgrade(&view);
        let runtime = Handle::try_current().ok();
        bridge.set_on_ready(move || {
            let Some(view) = weak.upgrade() else {
                return;
            };
            match runtime.or_else(|| Handle::try_current().ok()) {
                Some(handle) => {
                    handle.spawn(view.engine_became_ready());
                }
                None => tracing::warn!("engine ready outside a runtime; view not re-applied"),
            }
        });

        view
    }

    /// Receive every failure the view runs into.
    pub fn set_on_error<F>(&self, listener: F)
    where
        F: Fn(&BridgeError) + Send + Sync + 'static,
    {
        *lock(&self.on_error) = Some(Arc::new(listener));
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn phase(&self) -> LoadPhase {
        lock(&self.phase).clone()
    }

    pub fn props(&self) -> ViewProps {
        lock(&self.props).clone()
    }

    pub fn applied(&self) -> ViewDisplayState {
        lock(&self.applied).clone()
    }

    /// Take a new snapshot of the external state and push what changed.
    pub async fn update(self: &Arc<Self>, props: ViewProps) {
        let size_changed = {
            let mut current = lock(&self.props);
            let changed = current.size != props.size;
            *current = props;
            changed
        };

        if !self.bridge.is_ready() {
            let has_content = !lock(&self.props).content.trim().is_empty();
            let mut phase = lock(&self.phase);
            if has_content && *phase == LoadPhase::Idle {
                *phase = LoadPhase::Requested;
            }
            return;
        }

        self.sync().await;
        if size_changed {
            self.schedule_resize();
        }
    }

    pub async fn set_content(self: &Arc<Self>, content: impl Into<String>) {
        let props = ViewProps {
            content: content.into(),
            ..self.props()
        };
        self.update(props).await;
    }

    pub async fn set_zoom(self: &Arc<Self>, zoom: f64) {
        let props = ViewProps {
            zoom,
            ..self.props()
        };
        self.update(props).await;
    }

    pub async fn set_transpose(self: &Arc<Self>, transpose: i32) {
        let props = ViewProps {
            transpose,
            ..self.props()
        };
        self.update(props).await;
    }

    pub async fn set_display_option(self: &Arc<Self>, option: DisplayOption, enabled: bool) {
        let mut props = self.props();
        props.display.set(option, enabled);
        self.update(props).await;
    }

    pub async fn set_margins(self: &Arc<Self>, margins: PageMargins) {
        let props = ViewProps {
            margins,
            ..self.props()
        };
        self.update(props).await;
    }

    /// Record a container size. Forwarded after the debounce window if it
    /// moved past the threshold.
    pub fn set_container_size(self: &Arc<Self>, size: ContainerSize) {
        lock(&self.props).size = Some(size);
        self.schedule_resize();
    }

    /// Push every gated value that differs from the last applied one.
    async fn sync(&self) {
        let _serial = self.serial.lock().await;
        self.sync_locked().await;
    }

    /// Body of [`ScoreView::sync`]; the caller holds `serial`.
    async fn sync_locked(&self) {
        if !self.bridge.is_ready() {
            return;
        }
        self.synced_since_ready.store(true, Ordering::SeqCst);
        let props = self.props();

        let mut stale = self.sync_display(&props).await;
        stale |= self.sync_margins(&props).await;
        if self.sync_content(&props).await {
            stale = false;
        }

        if self.phase() == LoadPhase::Loaded {
            stale |= self.sync_transpose(&props).await;
            stale |= self.sync_zoom(&props).await;
            if stale {
                let result = self.bridge.render().await;
                self.settle(result);
            }
        }
    }

    /// Returns true when a load and render completed.
    async fn sync_content(&self, props: &ViewProps) -> bool {
        if props.content.trim().is_empty() {
            return false;
        }
        let digest = content_digest(&props.content);
        if lock(&self.applied).content.as_deref() == Some(digest.as_str()) {
            return false;
        }

        self.set_phase(LoadPhase::Loading);
        let result = self.bridge.load_and_render(&props.content).await;
        lock(&self.applied).content = Some(digest.clone());

        match result {
            Ok(()) => {
                lock(&self.applied).reset_derived();
                self.set_phase(LoadPhase::Loaded);
                tracing::info!(digest = %digest, "content loaded");
                self.bridge
                    .events()
                    .emit(Event::ContentLoaded { digest });
                true
            }
            Err(e) => {
                self.set_phase(LoadPhase::Failed(e.clone()));
                self.report(&e);
                false
            }
        }
    }

    /// Returns true when at least one option changed on the engine side.
    async fn sync_display(&self, props: &ViewProps) -> bool {
        let changed: Vec<(DisplayOption, bool)> = {
            let applied = lock(&self.applied);
            DisplayOption::ALL
                .into_iter()
                .map(|option| (option, props.display.get(option)))
                .filter(|(option, enabled)| applied.display.get(option) != Some(enabled))
                .collect()
        };
        if changed.is_empty() {
            return false;
        }

        let results = futures::future::join_all(
            changed
                .iter()
                .map(|(option, enabled)| self.bridge.set_display_option(*option, *enabled)),
        )
        .await;

        let mut any = false;
        for ((option, enabled), result) in changed.into_iter().zip(results) {
            lock(&self.applied).display.insert(option, enabled);
            any |= self.settle(result);
        }
        any
    }

    async fn sync_margins(&self, props: &ViewProps) -> bool {
        if lock(&self.applied).margins == Some(props.margins) {
            return false;
        }
        let result = self.bridge.set_page_margins(props.margins).await;
        lock(&self.applied).margins = Some(props.margins);
        self.settle(result)
    }

    async fn sync_transpose(&self, props: &ViewProps) -> bool {
        if lock(&self.applied).transpose == Some(props.transpose) {
            return false;
        }
        let result = self.bridge.set_transpose(props.transpose).await;
        lock(&self.applied).transpose = Some(props.transpose);
        self.settle(result)
    }

    async fn sync_zoom(&self, props: &ViewProps) -> bool {
        if lock(&self.applied).zoom == Some(props.zoom) {
            return false;
        }
        let result = self.bridge.set_zoom(props.zoom).await;
        lock(&self.applied).zoom = Some(props.zoom);
        self.settle(result)
    }

    fn schedule_resize(self: &Arc<Self>) {
        let Some(size) = lock(&self.props).size else {
            return;
        };
        let applied = lock(&self.applied).size;
        if applied.is_some_and(|a| !size.differs_from(&a, self.config.resize_threshold)) {
            return;
        }

        let generation = self.resize_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let view = Arc::downgrade(self);
        let delay = self.config.resize_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(view) = view.upgrade() else {
                return;
            };
            // A newer size arrived during the window; it owns the flush.
            if view.resize_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            view.flush_size().await;
        });
    }

    /// Forward the latest container size now, if it moved enough.
    async fn flush_size(&self) {
        let _serial = self.serial.lock().await;
        if !self.bridge.is_ready() {
            return;
        }
        let Some(size) = lock(&self.props).size else {
            return;
        };
        if size.is_empty() {
            return;
        }
        let applied = lock(&self.applied).size;
        if applied.is_some_and(|a| !size.differs_from(&a, self.config.resize_threshold)) {
            return;
        }

        tracing::debug!(size = %size, "forwarding container size");
        let result = self.bridge.update_container_size(size).await;
        lock(&self.applied).size = Some(size);
        self.settle(result);
    }

    /// First readiness: open every gate once and apply the current props.
    ///
    /// An `update` that reached the engine during the settle delay has
    /// already applied everything from a clean slate, so the gates stay
    /// as it left them.
    async fn engine_became_ready(self: Arc<Self>) {
        tokio::time::sleep(self.config.settle_delay).await;
        {
            let _serial = self.serial.lock().await;
            if !self.synced_since_ready.load(Ordering::SeqCst) {
                // Content that already made it in is not reloaded.
                let mut applied = lock(&self.applied);
                let content = applied.content.take();
                *applied = ViewDisplayState {
                    content,
                    ..ViewDisplayState::default()
                };
            }
            self.sync_locked().await;
        }
        self.flush_size().await;
    }

    fn set_phase(&self, phase: LoadPhase) {
        *lock(&self.phase) = phase;
    }

    /// Report a failure; true when the call succeeded.
    fn settle(&self, result: Result<(), BridgeError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    fn report(&self, error: &BridgeError) {
        tracing::warn!(error = %error, kind = error.kind(), "view update failed");
        let listener = lock(&self.on_error).clone();
        if let Some(listener) = listener {
            listener(error);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
