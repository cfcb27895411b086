//! Error types for the capture and print pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere between the browser view and the printer
#[derive(Error, Debug)]
pub enum Error {
    /// The `printable-content` element never appeared within the readiness window
    #[error("Printable content not found after {timeout_ms}ms")]
    ElementNotFound { timeout_ms: u64 },

    /// The element measured with a zero width or height
    #[error("Printable content has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },

    /// Tiled capture failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Stitching the captured tiles failed
    #[error(transparent)]
    Stitch(#[from] StitchError),

    /// Building or sending the print job failed
    #[error(transparent)]
    Print(#[from] PrintError),

    /// A script request could not be evaluated or returned unusable data
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// The worker owning the browser view has gone away
    #[error("Browser view closed: {0}")]
    ViewClosed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl Error {
    /// Short message suitable for showing to the person who pressed "print".
    pub fn user_message(&self) -> String {
        match self {
            Error::ElementNotFound { .. } => {
                "The page is still loading or has nothing to print. Try again.".to_string()
            }
            Error::ZeroDimensions { .. } => "The printable area on this page is empty.".to_string(),
            Error::Capture(CaptureError::SurfaceUnavailable(_)) => {
                "The page is not visible right now, so it could not be captured.".to_string()
            }
            Error::Capture(CaptureError::NoTiles) => "Nothing was captured from the page.".to_string(),
            Error::Stitch(_) => "The captured page could not be assembled.".to_string(),
            Error::Print(PrintError::Transport(msg)) => format!("Printer error: {}", msg),
            Error::Print(_) => "The page could not be converted for printing.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Failures of the tiled capture loop
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The view could not produce a snapshot (surface not attached)
    #[error("Capture surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The loop finished without producing a single tile
    #[error("No tiles were captured")]
    NoTiles,

    /// `run` was called on a session that already ran
    #[error("Capture session already used")]
    SessionConsumed,
}

/// Failures of the stitching engine
#[derive(Error, Debug)]
pub enum StitchError {
    /// None of the supplied tiles could be decoded
    #[error("No usable tiles to stitch")]
    NoUsableTiles,

    /// Tiles were supplied out of scroll order
    #[error("Tile out of order: expected ordinal {expected}, found {found}")]
    OutOfOrder { expected: usize, found: usize },

    /// The stitched canvas could not be encoded
    #[error("Canvas encoding failed: {0}")]
    EncodeFailed(String),
}

/// Failures while converting to printer raster or sending it
#[derive(Error, Debug)]
pub enum PrintError {
    /// The canvas image could not be decoded
    #[error("Canvas decode failed: {0}")]
    DecodeFailed(String),

    /// The image has no printable area after resizing
    #[error("Invalid print dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The printer link refused the connection or the write
    #[error("Printer transport failed: {0}")]
    Transport(String),
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_convert_into_top_level() {
        let err: Error = StitchError::NoUsableTiles.into();
        assert!(matches!(err, Error::Stitch(StitchError::NoUsableTiles)));
        assert_eq!(err.to_string(), "No usable tiles to stitch");
    }

    #[test]
    fn user_message_for_timeout_mentions_loading() {
        let err = Error::ElementNotFound { timeout_ms: 10_000 };
        assert!(err.user_message().contains("still loading"));
        assert!(err.to_string().contains("10000ms"));
    }

    #[test]
    fn transport_message_keeps_cause() {
        let err: Error = PrintError::Transport("link down".into()).into();
        assert_eq!(err.user_message(), "Printer error: link down");
    }
}
