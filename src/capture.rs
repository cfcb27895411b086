//! Tiled capture loop
//!
//! The element is scrolled one viewport at a time and the visible region is
//! snapshotted after a settle delay. The loop is an explicit state machine
//! (`Idle → Scrolling → Settling → Snapshotting → … → Done | Aborted`) driven
//! by async suspension points rather than blocking sleeps.

use crate::async_api::ViewHandle;
use crate::session::SessionToken;
use crate::view::{parse_scroll_offset, ScriptRequest, SnapshotRegion};
use crate::{CaptureError, ElementGeometry, Error, Result, Tile};
use std::time::Duration;

/// Number of tiles needed to cover `total_height` in steps of `viewport_height`.
pub fn tile_count(total_height: u32, viewport_height: u32) -> usize {
    if viewport_height == 0 {
        return 0;
    }
    let total = total_height as u64;
    let step = viewport_height as u64;
    ((total + step - 1) / step) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Scrolling(usize),
    Settling(usize),
    Snapshotting(usize),
    Done,
    Aborted,
}

/// How a capture run ended when it did not fail
#[derive(Debug)]
pub enum CaptureOutcome {
    /// All tiles, in scroll order
    Completed(Vec<Tile>),
    /// The session was superseded or torn down; partial tiles were discarded
    Aborted,
}

/// One full-element capture attempt. Single use.
#[derive(Debug)]
pub struct CaptureSession {
    geometry: ElementGeometry,
    pixel_ratio: f32,
    viewport_height: u32,
    tile_count: usize,
    token: SessionToken,
    state: CaptureState,
    tiles: Vec<Tile>,
    overlap_rows: u32,
}

impl CaptureSession {
    /// `viewport_height` is the scroll step in DIP.
    pub fn new(
        geometry: ElementGeometry,
        pixel_ratio: f32,
        viewport_height: u32,
        token: SessionToken,
    ) -> Result<Self> {
        geometry.validate()?;
        if viewport_height == 0 {
            return Err(Error::ZeroDimensions {
                width: geometry.width,
                height: viewport_height,
            });
        }

        let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio >= 1.0 {
            pixel_ratio
        } else {
            log::warn!("device pixel ratio {} out of range, using 1.0", pixel_ratio);
            1.0
        };

        let tile_count = tile_count(geometry.total_height, viewport_height);
        Ok(Self {
            geometry,
            pixel_ratio,
            viewport_height,
            tile_count,
            token,
            state: CaptureState::Idle,
            tiles: Vec::with_capacity(tile_count),
            overlap_rows: 0,
        })
    }

    pub fn geometry(&self) -> ElementGeometry {
        self.geometry
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    fn transition(&mut self, next: CaptureState) {
        log::debug!("session {}: {:?} -> {:?}", self.token.id(), self.state, next);
        self.state = next;
    }

    fn abort(&mut self) -> CaptureOutcome {
        log::debug!(
            "session {} aborted in {:?}, discarding {} tile(s)",
            self.token.id(),
            self.state,
            self.tiles.len()
        );
        self.tiles.clear();
        self.state = CaptureState::Aborted;
        CaptureOutcome::Aborted
    }

    /// Scroll and return the offset the page actually applied.
    async fn scroll_to(&self, view: &ViewHandle, offset: u32) -> Result<u32> {
        let res = view.evaluate(ScriptRequest::ScrollTo(offset)).await?;
        parse_scroll_offset(&res)?.ok_or_else(|| {
            Error::ScriptError("printable element disappeared while scrolling".into())
        })
    }

    fn device_rows(&self, dip: u32) -> u32 {
        (dip as f32 * self.pixel_ratio).round() as u32
    }

    /// Drive the state machine to completion.
    ///
    /// Liveness is checked before every scroll command, after every settle
    /// delay and after every snapshot reply. On error the partial tiles are
    /// dropped and the session ends in `Aborted`.
    pub async fn run(&mut self, view: &ViewHandle, settle_delay: Duration) -> Result<CaptureOutcome> {
        if self.state != CaptureState::Idle {
            return Err(CaptureError::SessionConsumed.into());
        }
        let res = self.drive(view, settle_delay).await;
        if res.is_err() {
            self.tiles.clear();
            self.state = CaptureState::Aborted;
        }
        res
    }

    async fn drive(&mut self, view: &ViewHandle, settle_delay: Duration) -> Result<CaptureOutcome> {
        loop {
            let finished = matches!(self.state, CaptureState::Done | CaptureState::Aborted);
            if !finished && !self.token.is_live() {
                return Ok(self.abort());
            }

            match self.state {
                CaptureState::Idle => {
                    self.scroll_to(view, 0).await?;
                    if self.tile_count == 0 {
                        self.transition(CaptureState::Done);
                    } else {
                        self.transition(CaptureState::Scrolling(0));
                    }
                }
                CaptureState::Scrolling(i) => {
                    let offset = (i as u32).saturating_mul(self.viewport_height);
                    let applied = self.scroll_to(view, offset).await?;
                    // The page clamps scrollTop at the end of the content, so
                    // the last tile can start above the requested offset.
                    self.overlap_rows = self
                        .device_rows(offset)
                        .saturating_sub(self.device_rows(applied.min(offset)));
                    if self.overlap_rows > 0 {
                        log::debug!(
                            "tile {} scrolled to {} instead of {}, {} overlapping row(s)",
                            i,
                            applied,
                            offset,
                            self.overlap_rows
                        );
                    }
                    self.transition(CaptureState::Settling(i));
                }
                CaptureState::Settling(i) => {
                    tokio::select! {
                        _ = tokio::time::sleep(settle_delay) => {}
                        _ = self.token.cancelled() => {}
                    }
                    self.transition(CaptureState::Snapshotting(i));
                }
                CaptureState::Snapshotting(i) => {
                    let region = SnapshotRegion {
                        x: self.geometry.x,
                        y: self.geometry.y,
                        width: self.geometry.width,
                        height: self.viewport_height,
                    };
                    let res = view.snapshot(region, self.pixel_ratio).await;
                    if !self.token.is_live() {
                        return Ok(self.abort());
                    }
                    let data = res.map_err(|e| match e {
                        Error::Capture(c) => c,
                        other => CaptureError::SurfaceUnavailable(other.to_string()),
                    })?;
                    self.tiles.push(Tile::new(i, data).with_overlap(self.overlap_rows));

                    if i + 1 < self.tile_count {
                        self.transition(CaptureState::Scrolling(i + 1));
                    } else {
                        self.transition(CaptureState::Done);
                    }
                }
                CaptureState::Done => {
                    let tiles = std::mem::take(&mut self.tiles);
                    if tiles.is_empty() {
                        return Err(CaptureError::NoTiles.into());
                    }
                    log::info!(
                        "session {} captured {} tile(s) at {}x",
                        self.token.id(),
                        tiles.len(),
                        self.pixel_ratio
                    );
                    return Ok(CaptureOutcome::Completed(tiles));
                }
                CaptureState::Aborted => return Ok(CaptureOutcome::Aborted),
            }
        }
    }
}

/// Capture every tile of the element. See [`CaptureSession::run`].
pub async fn capture(
    view: &ViewHandle,
    geometry: ElementGeometry,
    pixel_ratio: f32,
    viewport_height: u32,
    token: SessionToken,
    settle_delay: Duration,
) -> Result<CaptureOutcome> {
    let mut session = CaptureSession::new(geometry, pixel_ratio, viewport_height, token)?;
    session.run(view, settle_delay).await
}
