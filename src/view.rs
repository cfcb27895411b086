//! Browser view boundary: script requests and surface snapshots
//!
//! Backends implement [`WebView`]. The pipeline never talks to a view
//! directly; it goes through [`crate::async_api::ViewHandle`], which owns the
//! view on a worker thread.

use crate::stitch::encode_png;
use crate::{
    CaptureError, ElementGeometry, Error, Result, ScriptResult, Viewport, PRINTABLE_ELEMENT_ID,
};
use image::{Rgba, RgbaImage};
use std::sync::{Arc, Mutex};

/// A request evaluated inside the page through the script bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRequest {
    /// Boolean: does the printable element exist yet
    ElementExists,
    /// JSON `{x, y, width, height, totalHeight}` or `null`
    MeasureElement,
    /// Set the element's vertical scroll offset (DIP). Replies with the
    /// offset the page actually applied, or `false` if the element is gone.
    ScrollTo(u32),
}

const EXISTS_TEMPLATE: &str = "document.getElementById('{{ID}}') !== null";

const MEASURE_TEMPLATE: &str = r#"(function() {
    const el = document.getElementById('{{ID}}');
    if (!el) return null;
    const r = el.getBoundingClientRect();
    return JSON.stringify({
        x: Math.max(0, Math.round(r.left)),
        y: Math.max(0, Math.round(r.top)),
        width: Math.max(0, Math.round(r.width)),
        height: Math.max(0, Math.round(r.height)),
        totalHeight: el.scrollHeight
    });
})()"#;

const SCROLL_TEMPLATE: &str = r#"(function() {
    const el = document.getElementById('{{ID}}');
    if (!el) return false;
    el.scrollTo(0, {{OFFSET}});
    return Math.round(el.scrollTop);
})()"#;

impl ScriptRequest {
    /// JavaScript source for engines that evaluate real scripts.
    pub fn source(&self) -> String {
        match self {
            ScriptRequest::ElementExists => EXISTS_TEMPLATE.replace("{{ID}}", PRINTABLE_ELEMENT_ID),
            ScriptRequest::MeasureElement => {
                MEASURE_TEMPLATE.replace("{{ID}}", PRINTABLE_ELEMENT_ID)
            }
            ScriptRequest::ScrollTo(offset) => SCROLL_TEMPLATE
                .replace("{{ID}}", PRINTABLE_ELEMENT_ID)
                .replace("{{OFFSET}}", &offset.to_string()),
        }
    }
}

/// Parse a `ScrollTo` reply into the applied offset. `Ok(None)` means the
/// element is gone.
pub fn parse_scroll_offset(result: &ScriptResult) -> Result<Option<u32>> {
    let value = result.json()?;
    if value.is_null() || value == serde_json::Value::Bool(false) {
        return Ok(None);
    }
    value
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| Some(v.round() as u32))
        .ok_or_else(|| Error::ScriptError(format!("Unexpected scroll offset: {}", value)))
}

/// Parse a `MeasureElement` reply. `Ok(None)` means the element is gone.
pub fn parse_geometry(result: &ScriptResult) -> Result<Option<ElementGeometry>> {
    let value = result.json()?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| Error::ScriptError(format!("Unexpected geometry payload: {}", e)))
}

/// Region of the surface to snapshot, in device-independent pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Core trait for embedded browser views
pub trait WebView {
    /// Evaluate a script request in the page context
    fn evaluate(&mut self, request: &ScriptRequest) -> Result<ScriptResult>;

    /// Snapshot the currently rendered region as PNG bytes at `pixel_ratio`
    fn snapshot(&mut self, region: SnapshotRegion, pixel_ratio: f32) -> Result<Vec<u8>>;

    /// Visible surface size in DIP
    fn viewport(&self) -> Viewport;

    /// Ratio between DIP and physical pixels reported by the view
    fn device_pixel_ratio(&self) -> f32;

    /// Close the view and release its resources
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Record of what a [`ScriptedView`] was asked to do, shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct ScrollJournal {
    inner: Arc<Mutex<JournalEntries>>,
}

#[derive(Debug, Default)]
struct JournalEntries {
    scrolls: Vec<u32>,
    snapshots: usize,
    exists_checks: usize,
}

impl ScrollJournal {
    fn with<R>(&self, f: impl FnOnce(&mut JournalEntries) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Scroll offsets in the order they were applied
    pub fn scrolls(&self) -> Vec<u32> {
        self.with(|j| j.scrolls.clone())
    }

    pub fn snapshots(&self) -> usize {
        self.with(|j| j.snapshots)
    }

    pub fn exists_checks(&self) -> usize {
        self.with(|j| j.exists_checks)
    }
}

/// Deterministic in-memory view simulating a scrollable printable element.
///
/// Every content row renders a distinct colour ([`ScriptedView::row_color`])
/// so stitched output can be checked row by row. Scroll offsets are clamped
/// to `total_height - box height` the way a DOM clamps `scrollTop`; rows past
/// the end of the content render white. Used by tests, benchmarks and the
/// `demo` command.
#[derive(Debug)]
pub struct ScriptedView {
    width: u32,
    total_height: u32,
    box_height: Option<u32>,
    viewport: Viewport,
    pixel_ratio: f32,
    ready_after: u32,
    exists_checks: u32,
    scroll_top: u32,
    detached_from: Option<usize>,
    corrupt: Vec<usize>,
    snapshots_taken: usize,
    journal: ScrollJournal,
}

impl ScriptedView {
    /// An element `width` DIP wide with `total_height` DIP of scrollable content.
    pub fn new(width: u32, total_height: u32) -> Self {
        Self {
            width,
            total_height,
            box_height: None,
            viewport: Viewport::default(),
            pixel_ratio: 1.0,
            ready_after: 0,
            exists_checks: 0,
            scroll_top: 0,
            detached_from: None,
            corrupt: Vec::new(),
            snapshots_taken: 0,
            journal: ScrollJournal::default(),
        }
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Override the element's visible box height (defaults to filling the viewport)
    pub fn with_box_height(mut self, height: u32) -> Self {
        self.box_height = Some(height);
        self
    }

    /// The element appears only after `polls` failed existence checks
    pub fn ready_after_polls(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }

    /// The element never appears
    pub fn never_ready(self) -> Self {
        self.ready_after_polls(u32::MAX)
    }

    /// Snapshots fail from the `ordinal`-th request onwards
    pub fn detach_surface_at(mut self, ordinal: usize) -> Self {
        self.detached_from = Some(ordinal);
        self
    }

    /// The `ordinal`-th snapshot returns bytes that are not an image
    pub fn corrupt_tile(mut self, ordinal: usize) -> Self {
        self.corrupt.push(ordinal);
        self
    }

    pub fn journal(&self) -> ScrollJournal {
        self.journal.clone()
    }

    /// Colour of device-pixel content row `row`.
    pub fn row_color(row: u32) -> Rgba<u8> {
        Rgba([(row % 256) as u8, ((row / 256) % 256) as u8, 0x80, 255])
    }

    fn is_ready(&self) -> bool {
        self.exists_checks > self.ready_after
    }

    fn box_height(&self) -> u32 {
        self.box_height
            .unwrap_or_else(|| self.viewport.height.min(self.total_height))
    }

    fn geometry(&self) -> ElementGeometry {
        ElementGeometry {
            x: 0,
            y: 0,
            width: self.width,
            height: self.box_height(),
            total_height: self.total_height,
        }
    }

    fn max_scroll(&self) -> u32 {
        self.total_height.saturating_sub(self.box_height())
    }

    fn scaled(&self, dip: u32, ratio: f32) -> u32 {
        (dip as f32 * ratio).round() as u32
    }
}

impl WebView for ScriptedView {
    fn evaluate(&mut self, request: &ScriptRequest) -> Result<ScriptResult> {
        match request {
            ScriptRequest::ElementExists => {
                self.exists_checks = self.exists_checks.saturating_add(1);
                self.journal.with(|j| j.exists_checks += 1);
                Ok(ScriptResult::ok(self.is_ready().to_string()))
            }
            ScriptRequest::MeasureElement => {
                if !self.is_ready() {
                    return Ok(ScriptResult::ok("null"));
                }
                let g = self.geometry();
                let payload = serde_json::json!({
                    "x": g.x,
                    "y": g.y,
                    "width": g.width,
                    "height": g.height,
                    "totalHeight": g.total_height,
                });
                Ok(ScriptResult::ok(payload.to_string()))
            }
            ScriptRequest::ScrollTo(offset) => {
                if !self.is_ready() {
                    return Ok(ScriptResult::ok("false"));
                }
                self.scroll_top = (*offset).min(self.max_scroll());
                self.journal.with(|j| j.scrolls.push(*offset));
                Ok(ScriptResult::ok(self.scroll_top.to_string()))
            }
        }
    }

    fn snapshot(&mut self, region: SnapshotRegion, pixel_ratio: f32) -> Result<Vec<u8>> {
        let ordinal = self.snapshots_taken;
        self.snapshots_taken += 1;
        self.journal.with(|j| j.snapshots += 1);

        if self.detached_from.is_some_and(|from| ordinal >= from) {
            return Err(CaptureError::SurfaceUnavailable("surface detached".into()).into());
        }
        if self.corrupt.contains(&ordinal) {
            return Ok(b"not a png".to_vec());
        }

        let width = self.scaled(region.width, pixel_ratio);
        let height = self.scaled(region.height, pixel_ratio);
        let top = self.scaled(self.scroll_top, pixel_ratio);
        let content_rows = self.scaled(self.total_height, pixel_ratio);

        let img = RgbaImage::from_fn(width, height, |_, y| {
            let row = top + y;
            if row < content_rows {
                Self::row_color(row)
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        encode_png(&img).map_err(|e| Error::ScriptError(format!("Snapshot encode failed: {}", e)))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}
