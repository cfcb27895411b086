//! End-to-end capture and print pipeline
//!
//! Readiness → measure → tiled capture → stitch → raster → transport. Each
//! stage failure ends the attempt with an error; nothing is retried and no
//! state survives that would prevent running the pipeline again.

use crate::async_api::ViewHandle;
use crate::capture::{CaptureOutcome, CaptureSession};
use crate::raster::build_print_job;
use crate::readiness::wait_for_element;
use crate::session::SessionRegistry;
use crate::stitch::{stitch, Canvas};
use crate::transport::{send_print_job, PrinterTransport};
use crate::view::{parse_geometry, ScriptRequest};
use crate::{CaptureConfig, ElementGeometry, Error, PrintJob, PrinterConfig, Result};

pub struct PrintPipeline {
    view: ViewHandle,
    capture: CaptureConfig,
    printer: PrinterConfig,
    sessions: SessionRegistry,
}

impl PrintPipeline {
    pub fn new(view: ViewHandle, capture: CaptureConfig, printer: PrinterConfig) -> Self {
        Self {
            view,
            capture,
            printer,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn view(&self) -> &ViewHandle {
        &self.view
    }

    pub fn printer_config(&self) -> &PrinterConfig {
        &self.printer
    }

    /// The hosting view is going away: abort any capture in flight.
    pub fn teardown(&self) {
        self.sessions.teardown();
    }

    /// Measure the printable element once.
    pub async fn measure(&self) -> Result<ElementGeometry> {
        let res = self.view.evaluate(ScriptRequest::MeasureElement).await?;
        parse_geometry(&res)?.ok_or(Error::ElementNotFound {
            timeout_ms: self.capture.readiness_timeout_ms,
        })
    }

    /// Capture and stitch the printable element.
    ///
    /// Returns `Ok(None)` when the attempt was superseded by a newer one or
    /// torn down before finishing.
    pub async fn capture_canvas(&self) -> Result<Option<Canvas>> {
        // Claim the view first so any older capture stops scrolling it.
        let token = self.sessions.begin();

        let ready = tokio::select! {
            ready = wait_for_element(
                &self.view,
                self.capture.readiness_timeout(),
                self.capture.poll_interval(),
            ) => ready,
            _ = token.cancelled() => false,
        };
        if !token.is_live() {
            log::debug!("session {} cancelled while waiting for the element", token.id());
            return Ok(None);
        }
        if !ready {
            return Err(Error::ElementNotFound {
                timeout_ms: self.capture.readiness_timeout_ms,
            });
        }

        let measured = self.measure().await;
        if !token.is_live() {
            log::debug!("session {} cancelled while measuring", token.id());
            return Ok(None);
        }
        let geometry = measured?;
        geometry.validate()?;
        let (viewport, pixel_ratio) = self.view.metrics().await?;
        let viewport_height = geometry.visible_height(viewport);
        log::info!(
            "measured printable element {}x{} (scroll step {}, ratio {})",
            geometry.width,
            geometry.total_height,
            viewport_height,
            pixel_ratio
        );

        let mut session = CaptureSession::new(geometry, pixel_ratio, viewport_height, token)?;
        let tiles = match session.run(&self.view, self.capture.settle_delay()).await? {
            CaptureOutcome::Completed(tiles) => tiles,
            CaptureOutcome::Aborted => return Ok(None),
        };

        let canvas = stitch(&tiles, geometry.width, geometry.total_height, session.pixel_ratio())?;
        Ok(Some(canvas))
    }

    /// Capture the element and convert it into a print job without sending it.
    pub async fn prepare_job(&self) -> Result<Option<PrintJob>> {
        let Some(canvas) = self.capture_canvas().await? else {
            return Ok(None);
        };
        let png = canvas.to_png()?;
        let job = build_print_job(&png, &self.printer)?;
        log::info!(
            "print job {} ready: {}x{} dots, {} bytes",
            job.fingerprint(),
            job.width_dots(),
            job.height_dots(),
            job.len()
        );
        Ok(Some(job))
    }

    /// Capture, convert and send to the printer at `address`.
    pub async fn print<T>(&self, transport: &mut T, address: &str) -> Result<Option<PrintJob>>
    where
        T: PrinterTransport + ?Sized,
    {
        let Some(job) = self.prepare_job().await? else {
            return Ok(None);
        };
        send_print_job(transport, address, &job, &self.printer).await?;
        Ok(Some(job))
    }
}
