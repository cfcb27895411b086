//! Webprint
//!
//! Captures the `printable-content` element of a web page as one tall image
//! and turns it into a command stream for a thermal receipt printer.
//!
//! # Pipeline
//!
//! - **Readiness**: poll the page until the element exists ([`readiness`])
//! - **Capture**: scroll the element one viewport at a time and snapshot each
//!   position ([`capture`])
//! - **Stitch**: composite the ordered tiles into a single canvas ([`stitch`])
//! - **Raster**: resize to the print head, dither, and encode ([`raster`])
//! - **Transport**: write the finished job to the printer ([`transport`])
//!
//! # Example
//!
//! ```no_run
//! use webprint::{CaptureConfig, PrinterConfig};
//! use webprint::async_api::ViewHandle;
//! use webprint::pipeline::PrintPipeline;
//! use webprint::transport::DeviceTransport;
//! use webprint::view::ScriptedView;
//!
//! # async fn run() -> webprint::Result<()> {
//! let view = ViewHandle::spawn(|| Ok(ScriptedView::new(375, 1200))).await?;
//! let pipeline = PrintPipeline::new(view, CaptureConfig::default(), PrinterConfig::mm58());
//!
//! let mut transport = DeviceTransport::new();
//! if let Some(job) = pipeline.print(&mut transport, "/dev/rfcomm0").await? {
//!     println!("printed {} bytes", job.len());
//! }
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::time::Duration;

pub mod error;
pub use error::{CaptureError, Error, PrintError, Result, StitchError};

pub mod view;

// Async facade over a view owned by a worker thread
pub mod async_api;

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod capture;
pub mod escpos;
pub mod pipeline;
pub mod raster;
pub mod readiness;
pub mod session;
pub mod stitch;
pub mod transport;

pub use capture::{CaptureOutcome, CaptureSession, CaptureState};
pub use raster::PrintJob;
pub use stitch::Canvas;

/// DOM id of the element that gets printed. Fixed integration contract with the page.
pub const PRINTABLE_ELEMENT_ID: &str = "printable-content";

/// Geometry of the printable element, in device-independent pixels
///
/// Measured once per capture session from the element's bounding box and its
/// full scroll extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    /// Height of the visible element box
    pub height: u32,
    /// Full scrollable content height (`scrollHeight`)
    pub total_height: u32,
}

impl ElementGeometry {
    /// Fail fast when there is nothing to capture.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.total_height == 0 {
            return Err(Error::ZeroDimensions {
                width: self.width,
                height: self.total_height,
            });
        }
        Ok(())
    }

    /// Height of one scroll step: the element box clipped to the visible surface.
    ///
    /// Falls back to the surface height when the element box reports zero.
    pub fn visible_height(&self, viewport: Viewport) -> u32 {
        let room = viewport.height.saturating_sub(self.y);
        if self.height == 0 {
            room
        } else {
            self.height.min(room)
        }
    }
}

/// One snapshot of the element at a given scroll position
#[derive(Debug, Clone)]
pub struct Tile {
    /// 0-based position in scroll order
    pub ordinal: usize,
    /// Encoded image (PNG)
    pub data: Vec<u8>,
    /// Device rows at the top of the image that repeat the previous tile.
    ///
    /// Non-zero when the view clamped the scroll offset at the end of the
    /// content and the snapshot starts above the requested offset.
    pub overlap_rows: u32,
}

impl Tile {
    pub fn new(ordinal: usize, data: Vec<u8>) -> Self {
        Self { ordinal, data, overlap_rows: 0 }
    }

    pub fn with_overlap(mut self, rows: u32) -> Self {
        self.overlap_rows = rows;
        self
    }
}

/// Visible surface dimensions in device-independent pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 375,
            height: 800,
        }
    }
}

/// Result of a script request
///
/// `value` is the serialized result (usually JSON). `is_error` indicates
/// whether the script threw.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResult {
    /// Serialized result value
    pub value: String,
    /// Whether the script threw an error
    pub is_error: bool,
}

impl ScriptResult {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: message.into(),
            is_error: true,
        }
    }

    /// Interpret the value as a boolean. Errors and non-boolean values are `false`.
    pub fn as_bool(&self) -> bool {
        !self.is_error && self.value.trim() == "true"
    }

    /// Parse the value as JSON, unwrapping one level of string encoding.
    ///
    /// Engines differ in whether `JSON.stringify` output comes back as an
    /// object or as a quoted string, so both are accepted.
    pub fn json(&self) -> Result<serde_json::Value> {
        if self.is_error {
            return Err(Error::ScriptError(self.value.clone()));
        }
        let parsed: serde_json::Value = serde_json::from_str(self.value.trim())
            .map_err(|e| Error::ScriptError(format!("Malformed script result: {}", e)))?;
        match parsed {
            serde_json::Value::String(inner) => serde_json::from_str(&inner)
                .map_err(|e| Error::ScriptError(format!("Malformed script result: {}", e))),
            other => Ok(other),
        }
    }
}

/// Timing configuration for readiness polling and tiled capture
///
/// # Examples
///
/// ```
/// let cfg = webprint::CaptureConfig::default();
/// assert_eq!(cfg.readiness_timeout_ms, 10_000);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How long to wait for the printable element to appear
    pub readiness_timeout_ms: u64,
    /// Interval between existence checks
    pub poll_interval_ms: u64,
    /// Delay after each scroll before snapshotting, to let the view repaint
    pub settle_delay_ms: u64,
    /// Window size used when the pipeline launches its own browser
    pub viewport: Viewport,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 10_000,
            poll_interval_ms: 250,
            settle_delay_ms: 200,
            viewport: Viewport::default(),
        }
    }
}

impl CaptureConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Thermal printer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Printable dots per line (384 for 58mm heads, 576 for 80mm)
    pub width_dots: u32,
    /// Lines fed after the image
    pub feed_lines: u8,
    /// Maximum rows per raster command
    pub band_height: u32,
    /// Whether to append a cut command
    pub cut: bool,
    /// Bytes per transport write
    pub chunk_size: usize,
    /// Pause between transport writes, so slow serial links keep up
    pub chunk_delay_ms: u64,
    /// Timeout when opening a network printer connection
    pub connect_timeout_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::mm58()
    }
}

impl PrinterConfig {
    /// 58mm paper, 48mm print head at 203 dpi.
    pub fn mm58() -> Self {
        Self {
            width_dots: 384,
            feed_lines: 2,
            band_height: 256,
            cut: true,
            chunk_size: 512,
            chunk_delay_ms: 20,
            connect_timeout_ms: 5000,
        }
    }

    /// 80mm paper, 72mm print head at 203 dpi.
    pub fn mm80() -> Self {
        Self {
            width_dots: 576,
            ..Self::mm58()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width_dots == 0 || self.width_dots % 8 != 0 {
            return Err(Error::ConfigError(format!(
                "width_dots must be a positive multiple of 8, got {}",
                self.width_dots
            )));
        }
        if self.band_height == 0 || self.band_height > u16::MAX as u32 {
            return Err(Error::ConfigError(format!(
                "band_height must be between 1 and {}, got {}",
                u16::MAX,
                self.band_height
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::ConfigError("chunk_size must be positive".into()));
        }
        Ok(())
    }
}

/// On-disk configuration file shape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub printer: PrinterConfig,
}

impl Config {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.as_ref().display(), e)))?;
        config.printer.validate()?;
        Ok(config)
    }
}
