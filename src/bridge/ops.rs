//! Typed engine operations built on [`Bridge::call`].

use serde_json::{Value, json};

use super::params::{self, ContainerSize, DisplayOption, PageMargins, Parameter};
use super::{Bridge, Derived};
use crate::error::BridgeError;
use crate::protocol::js_call;

impl Bridge {
    /// Load score text into the engine. On success the engine's zoom and
    /// transposition are back at their defaults.
    pub async fn load_content(&self, text: &str) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        if text.trim().is_empty() {
            return Err(BridgeError::InvalidParameter("content is empty".to_string()));
        }
        let _cycle = self.begin_cycle();
        self.load(text).await
    }

    pub async fn render(&self) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        let _cycle = self.begin_cycle();
        self.call(js_call("render", &[])).await.map(drop)
    }

    /// Load then render as one in-flight cycle.
    pub async fn load_and_render(&self, text: &str) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        if text.trim().is_empty() {
            return Err(BridgeError::InvalidParameter("content is empty".to_string()));
        }
        let _cycle = self.begin_cycle();
        self.load(text).await?;
        self.call(js_call("render", &[])).await.map(drop)
    }

    /// Set the zoom factor. Repeating the current value is a no-op, also
    /// while an earlier call for the same value is still in flight.
    pub async fn set_zoom(&self, zoom: f64) -> Result<(), BridgeError> {
        params::validate_zoom(zoom)?;
        self.ensure_ready()?;
        let Some(previous) = self.claim_derived(|d| d.zoom = zoom) else {
            return Ok(());
        };
        let result = self.call(js_call("setZoom", &[json!(zoom)])).await;
        if result.is_err() {
            self.update_derived(|d| {
                if d.zoom == zoom {
                    d.zoom = previous.zoom;
                }
            });
        }
        result.map(drop)
    }

    /// Transpose by `semitones` relative to the loaded score. Repeating
    /// the current value is a no-op.
    pub async fn set_transpose(&self, semitones: i32) -> Result<(), BridgeError> {
        params::validate_transpose(semitones)?;
        self.ensure_ready()?;
        let Some(previous) = self.claim_derived(|d| d.transpose = semitones) else {
            return Ok(());
        };
        let result = self.call(js_call("setTranspose", &[json!(semitones)])).await;
        if result.is_err() {
            self.update_derived(|d| {
                if d.transpose == semitones {
                    d.transpose = previous.transpose;
                }
            });
        }
        result.map(drop)
    }

    pub async fn set_display_option(
        &self,
        option: DisplayOption,
        enabled: bool,
    ) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        self.call(js_call(
            "setOption",
            &[json!(option.engine_name()), json!(enabled)],
        ))
        .await
        .map(drop)
    }

    pub async fn set_page_margins(&self, margins: PageMargins) -> Result<(), BridgeError> {
        margins.validate()?;
        self.ensure_ready()?;
        self.call(js_call(
            "setPageMargins",
            &[
                json!(margins.top),
                json!(margins.right),
                json!(margins.bottom),
                json!(margins.left),
            ],
        ))
        .await
        .map(drop)
    }

    pub async fn update_container_size(&self, size: ContainerSize) -> Result<(), BridgeError> {
        size.validate()?;
        self.ensure_ready()?;
        self.call(js_call("resize", &[json!(size.width), json!(size.height)]))
            .await
            .map(drop)
    }

    /// Layout dimensions as reported by the engine. Shape is engine-defined.
    pub async fn query_layout(&self) -> Result<Value, BridgeError> {
        self.call(js_call("getLayout", &[])).await
    }

    /// Apply any single [`Parameter`].
    pub async fn set_parameter(&self, parameter: Parameter) -> Result<(), BridgeError> {
        match parameter {
            Parameter::Zoom(zoom) => self.set_zoom(zoom).await,
            Parameter::Transpose(semitones) => self.set_transpose(semitones).await,
            Parameter::Display(option, enabled) => self.set_display_option(option, enabled).await,
            Parameter::Margins(margins) => self.set_page_margins(margins).await,
            Parameter::ContainerSize(size) => self.update_container_size(size).await,
        }
    }

    async fn load(&self, text: &str) -> Result<(), BridgeError> {
        tracing::info!(bytes = text.len(), "loading content");
        self.call(js_call("loadScore", &[json!(text)])).await?;
        self.update_derived(|d| *d = Derived::default());
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), BridgeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(BridgeError::NotReady)
        }
    }
}
