//! Print raster converter
//!
//! Turns a stitched canvas into a finished printer command stream: resize to
//! the print head width, dither to one bit per dot, wrap in raster commands,
//! then feed and cut.

use crate::{escpos, PrintError, PrinterConfig, Result};
use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use sha2::{Digest, Sha256};

/// A complete, immutable byte sequence ready to be written to the printer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    bytes: Vec<u8>,
    width_dots: u32,
    height_dots: u32,
}

impl PrintJob {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Raster width in dots
    pub fn width_dots(&self) -> u32 {
        self.width_dots
    }

    /// Raster height in dot rows
    pub fn height_dots(&self) -> u32 {
        self.height_dots
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 of the command stream, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Height after scaling `width x height` to `target_width`, aspect preserved.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return 0;
    }
    (height as f64 * target_width as f64 / width as f64).round() as u32
}

/// Decode a PNG canvas and build the print job for it.
pub fn build_print_job(canvas_png: &[u8], config: &PrinterConfig) -> Result<PrintJob> {
    let img = image::load_from_memory(canvas_png)
        .map_err(|e| PrintError::DecodeFailed(e.to_string()))?;
    build_print_job_from_image(&img, config)
}

/// Build the print job for an already decoded image.
pub fn build_print_job_from_image(img: &DynamicImage, config: &PrinterConfig) -> Result<PrintJob> {
    config.validate()?;

    let (width, height) = img.dimensions();
    let target_width = config.width_dots;
    let target_height = scaled_height(width, height, target_width);
    if width == 0 || height == 0 || target_height == 0 {
        return Err(PrintError::InvalidDimensions {
            width: target_width,
            height: target_height,
        }
        .into());
    }

    let flat = flatten_onto_white(img);
    let resized = imageops::resize(&flat, target_width, target_height, FilterType::Triangle);
    let mut gray = imageops::grayscale(&resized);
    imageops::dither(&mut gray, &BiLevel);

    let width_bytes = (target_width / 8) as u16;
    let packed = pack_rows(&gray);

    let mut bytes = Vec::with_capacity(packed.len() + 64);
    bytes.extend_from_slice(&escpos::init());
    bytes.extend(escpos::raster(width_bytes, target_height, &packed, config.band_height));
    bytes.extend_from_slice(&escpos::feed_lines(config.feed_lines));
    if config.cut {
        bytes.extend_from_slice(&escpos::cut());
    }

    log::debug!(
        "raster {}x{} -> {}x{} dots, {} bytes",
        width,
        height,
        target_width,
        target_height,
        bytes.len()
    );

    Ok(PrintJob {
        bytes,
        width_dots: target_width,
        height_dots: target_height,
    })
}

/// Composite transparency onto white paper.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = p[3] as u16;
        let blend = |c: u8| ((c as u16 * a + 255 * (255 - a)) / 255) as u8;
        image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

/// Pack a bi-level image into rows of bytes, MSB first, 1 = black dot.
fn pack_rows(gray: &GrayImage) -> Vec<u8> {
    let width = gray.width() as usize;
    let row_bytes = width.div_ceil(8);
    let mut out = vec![0u8; row_bytes * gray.height() as usize];

    for (y, row) in gray.as_raw().chunks_exact(width).enumerate() {
        let dst = &mut out[y * row_bytes..(y + 1) * row_bytes];
        for (x, &luma) in row.iter().enumerate() {
            if luma < 128 {
                dst[x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn scaled_height_preserves_aspect() {
        assert_eq!(scaled_height(750, 2400, 384), 1229);
        assert_eq!(scaled_height(384, 100, 384), 100);
        assert_eq!(scaled_height(1000, 1, 384), 0);
        assert_eq!(scaled_height(0, 10, 384), 0);
    }

    #[test]
    fn black_image_packs_to_all_ones() {
        let job = build_print_job_from_image(&solid(768, 20, [0, 0, 0, 255]), &PrinterConfig::mm58())
            .unwrap();
        assert_eq!(job.width_dots(), 384);
        assert_eq!(job.height_dots(), 10);

        let bytes = job.bytes();
        assert_eq!(&bytes[..2], &escpos::init());
        assert_eq!(&bytes[2..10], &[0x1D, b'v', b'0', 0, 48, 0, 10, 0]);
        assert!(bytes[10..10 + 480].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[490..], &[0x1B, b'd', 2, 0x1D, b'V', 0]);
    }

    #[test]
    fn transparent_pixels_print_as_paper() {
        let job = build_print_job_from_image(&solid(384, 4, [0, 0, 0, 0]), &PrinterConfig::mm58())
            .unwrap();
        assert!(job.bytes()[10..10 + 48 * 4].iter().all(|&b| b == 0));
    }

    #[test]
    fn cut_can_be_disabled() {
        let config = PrinterConfig { cut: false, ..PrinterConfig::mm58() };
        let job = build_print_job_from_image(&solid(384, 4, [255; 4]), &config).unwrap();
        assert_eq!(&job.bytes()[job.len() - 3..], &[0x1B, b'd', 2]);
    }

    #[test]
    fn undecodable_canvas_is_reported() {
        let res = build_print_job(b"definitely not png", &PrinterConfig::mm58());
        assert!(matches!(res, Err(Error::Print(PrintError::DecodeFailed(_)))));
    }

    #[test]
    fn image_that_scales_to_nothing_is_rejected() {
        let res = build_print_job_from_image(&solid(2000, 1, [0, 0, 0, 255]), &PrinterConfig::mm58());
        assert!(matches!(
            res,
            Err(Error::Print(PrintError::InvalidDimensions { width: 384, height: 0 }))
        ));
    }

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let img = solid(384, 8, [40, 40, 40, 255]);
        let a = build_print_job_from_image(&img, &PrinterConfig::mm58()).unwrap();
        let b = build_print_job_from_image(&img, &PrinterConfig::mm58()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
