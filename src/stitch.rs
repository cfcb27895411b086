//! Stitching engine
//!
//! Composites ordered tiles top to bottom into a canvas sized to the
//! element's full content. Rows are copied as contiguous slices of an RGBA
//! arena rather than pixel by pixel.

use crate::{Error, Result, StitchError, Tile};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageResult, RgbaImage};

const BYTES_PER_PIXEL: usize = 4;

/// Encode an RGBA image as PNG.
pub(crate) fn encode_png(img: &RgbaImage) -> ImageResult<Vec<u8>> {
    encode_rgba(img.as_raw(), img.width(), img.height())
}

fn encode_rgba(pixels: &[u8], width: u32, height: u32) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(pixels, width, height, ExtendedColorType::Rgba8)?;
    Ok(buf)
}

/// Full-resolution composited image of the element. Fixed size once created.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    degraded_bands: usize,
}

impl Canvas {
    /// Opaque white canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * BYTES_PER_PIXEL],
            degraded_bands: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of tiles that could not be decoded and were left blank
    pub fn degraded_bands(&self) -> usize {
        self.degraded_bands
    }

    fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// RGBA bytes of row `y`
    ///
    /// # Panics
    ///
    /// Panics if `y >= self.height()`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        &self.pixels[start..start + self.stride()]
    }

    /// RGBA value at `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if `x >= self.width()` or `y >= self.height()`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let start = x as usize * BYTES_PER_PIXEL;
        let row = self.row(y);
        [row[start], row[start + 1], row[start + 2], row[start + 3]]
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels)
    }

    /// Lossless PNG encoding of the canvas
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_rgba(&self.pixels, self.width, self.height)
            .map_err(|e| StitchError::EncodeFailed(e.to_string()).into())
    }

    /// Copy `rows` rows of `tile`, starting at tile row `src_y`, to canvas
    /// rows starting at `write_y`.
    fn copy_rows(&mut self, tile: &RgbaImage, src_y: u32, write_y: u32, rows: u32) {
        let copy_bytes = tile.width().min(self.width) as usize * BYTES_PER_PIXEL;
        let src_stride = tile.width() as usize * BYTES_PER_PIXEL;
        let dst_stride = self.stride();
        let src = tile.as_raw();

        for y in 0..rows as usize {
            let s = (src_y as usize + y) * src_stride;
            let d = (write_y as usize + y) * dst_stride;
            self.pixels[d..d + copy_bytes].copy_from_slice(&src[s..s + copy_bytes]);
        }
    }
}

/// Composite `tiles` into a canvas of `round(target_width * pixel_ratio)` by
/// `round(target_height * pixel_ratio)` pixels.
///
/// Tiles must arrive with ordinals `0, 1, 2, …`. Each tile's
/// [`Tile::overlap_rows`] are skipped from its top, and the final tile is
/// clipped to the rows left on the canvas. A tile that fails to decode leaves
/// a blank band as tall as the first decodable tile so later tiles stay
/// aligned.
pub fn stitch(tiles: &[Tile], target_width: u32, target_height: u32, pixel_ratio: f32) -> Result<Canvas> {
    for (expected, tile) in tiles.iter().enumerate() {
        if tile.ordinal != expected {
            return Err(StitchError::OutOfOrder {
                expected,
                found: tile.ordinal,
            }
            .into());
        }
    }

    let decoded: Vec<Option<RgbaImage>> = tiles
        .iter()
        .map(|tile| match image::load_from_memory(&tile.data) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                log::warn!("tile {} could not be decoded, leaving a blank band: {}", tile.ordinal, e);
                None
            }
        })
        .collect();

    let nominal_height = decoded
        .iter()
        .flatten()
        .map(|img| img.height())
        .next()
        .ok_or(StitchError::NoUsableTiles)?;

    let width = (target_width as f32 * pixel_ratio).round() as u32;
    let height = (target_height as f32 * pixel_ratio).round() as u32;
    if width == 0 || height == 0 {
        return Err(Error::ZeroDimensions { width, height });
    }
    let mut canvas = Canvas::new(width, height);

    let mut warned_width = false;
    let mut write_y = 0u32;
    for (ordinal, (tile, slot)) in tiles.iter().zip(&decoded).enumerate() {
        if write_y >= canvas.height {
            log::debug!("canvas full, ignoring {} trailing tile(s)", tiles.len() - ordinal);
            break;
        }
        let remaining = canvas.height - write_y;

        match slot {
            Some(img) => {
                if img.width() != canvas.width && !warned_width {
                    log::warn!(
                        "tile width {} differs from canvas width {}; pixel ratio may not match the view",
                        img.width(),
                        canvas.width
                    );
                    warned_width = true;
                }
                let skip = tile.overlap_rows.min(img.height());
                let copy_height = (img.height() - skip).min(remaining);
                canvas.copy_rows(img, skip, write_y, copy_height);
                write_y += copy_height;
            }
            None => {
                canvas.degraded_bands += 1;
                write_y += nominal_height.saturating_sub(tile.overlap_rows).min(remaining);
            }
        }
    }

    if write_y < canvas.height {
        log::warn!("tiles covered {} of {} canvas rows", write_y, canvas.height);
    }
    if canvas.degraded_bands > 0 {
        log::warn!("stitched canvas has {} degraded band(s)", canvas.degraded_bands);
    }
    log::info!("stitched {} tile(s) into {}x{} canvas", tiles.len(), canvas.width, canvas.height);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn shade(row: u32) -> Rgba<u8> {
        Rgba([(row % 256) as u8, (row / 256) as u8, 7, 255])
    }

    /// Tile `ordinal` of a strip whose absolute row `r` is coloured `shade(r)`.
    fn band_tile(ordinal: usize, width: u32, height: u32) -> Tile {
        let top = ordinal as u32 * height;
        let img = RgbaImage::from_fn(width, height, |_, y| shade(top + y));
        Tile::new(ordinal, encode_png(&img).unwrap())
    }

    #[test]
    fn last_tile_is_clipped_to_canvas() {
        // Canvas 10 rows; tiles of 4 rows each: 4 + 4 + (2 of 4)
        let tiles: Vec<Tile> = (0..3).map(|i| band_tile(i, 6, 4)).collect();
        let canvas = stitch(&tiles, 6, 10, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (6, 10));
        for y in 0..10 {
            assert_eq!(canvas.pixel(3, y), shade(y).0, "row {}", y);
        }
    }

    #[test]
    fn overlapping_rows_of_a_clamped_tile_are_skipped() {
        // Content 10 rows, tiles of 4: the last scroll was clamped from 8 to 6,
        // so its image holds rows 6..10 and the first 2 repeat tile 1.
        let mut tiles: Vec<Tile> = (0..2).map(|i| band_tile(i, 6, 4)).collect();
        let last = RgbaImage::from_fn(6, 4, |_, y| shade(6 + y));
        tiles.push(Tile::new(2, encode_png(&last).unwrap()).with_overlap(2));

        let canvas = stitch(&tiles, 6, 10, 1.0).unwrap();
        for y in 0..10 {
            assert_eq!(canvas.pixel(0, y), shade(y).0, "row {}", y);
        }
    }

    #[test]
    fn scales_canvas_by_pixel_ratio() {
        let tiles: Vec<Tile> = (0..2).map(|i| band_tile(i, 20, 16)).collect();
        let canvas = stitch(&tiles, 10, 12, 2.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (20, 24));
        assert_eq!(canvas.pixel(0, 23), shade(23).0);
    }

    #[test]
    fn out_of_order_tiles_are_rejected() {
        let tiles = vec![band_tile(1, 4, 4), band_tile(0, 4, 4)];
        let res = stitch(&tiles, 4, 8, 1.0);
        assert!(matches!(
            res,
            Err(Error::Stitch(StitchError::OutOfOrder { expected: 0, found: 1 }))
        ));
    }

    #[test]
    fn no_tiles_is_an_error() {
        assert!(matches!(
            stitch(&[], 4, 8, 1.0),
            Err(Error::Stitch(StitchError::NoUsableTiles))
        ));
        let junk = vec![Tile::new(0, vec![1, 2, 3])];
        assert!(matches!(
            stitch(&junk, 4, 8, 1.0),
            Err(Error::Stitch(StitchError::NoUsableTiles))
        ));
    }

    #[test]
    fn corrupt_tile_leaves_one_blank_band() {
        let mut tiles: Vec<Tile> = (0..3).map(|i| band_tile(i, 4, 4)).collect();
        tiles[1].data = b"garbage".to_vec();
        let canvas = stitch(&tiles, 4, 12, 1.0).unwrap();
        assert_eq!(canvas.degraded_bands(), 1);
        assert_eq!(canvas.pixel(0, 3), shade(3).0);
        for y in 4..8 {
            assert_eq!(canvas.pixel(0, y), [255, 255, 255, 255]);
        }
        // The tile after the blank band stays aligned
        assert_eq!(canvas.pixel(0, 8), shade(8).0);
    }

    #[test]
    fn narrower_tiles_are_clamped_not_stretched() {
        let tiles = vec![band_tile(0, 3, 4)];
        let canvas = stitch(&tiles, 5, 4, 1.0).unwrap();
        assert_eq!(canvas.pixel(2, 0), shade(0).0);
        assert_eq!(canvas.pixel(4, 0), [255, 255, 255, 255]);
    }

    #[test]
    #[should_panic]
    fn pixel_outside_canvas_panics() {
        Canvas::new(4, 4).pixel(0, 4);
    }

    #[test]
    fn png_output_decodes_to_same_pixels() {
        let tiles: Vec<Tile> = (0..2).map(|i| band_tile(i, 4, 4)).collect();
        let canvas = stitch(&tiles, 4, 7, 1.0).unwrap();
        let png = canvas.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), canvas.clone().into_image().unwrap().as_raw());
    }
}
