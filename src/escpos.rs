//! ESC/POS command builders used for receipt raster printing.
//!
//! Only the handful of commands the print job needs: initialise, raster bit
//! image (`GS v 0`), feed and cut.

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;

/// `ESC @`: reset the printer to its power-on state
pub fn init() -> [u8; 2] {
    [ESC, b'@']
}

/// `ESC d n`: print the buffer and feed `lines` lines
pub fn feed_lines(lines: u8) -> [u8; 3] {
    [ESC, b'd', lines]
}

/// `GS V 0`: full cut
pub fn cut() -> [u8; 3] {
    [GS, b'V', 0]
}

/// `GS v 0` raster bit image header followed by the packed rows.
///
/// `width_bytes` is the row length in bytes (8 dots each), `rows` the number
/// of dot rows. `data` must hold exactly `width_bytes * rows` bytes, MSB
/// first, 1 = black.
pub fn raster_band(width_bytes: u16, rows: u16, data: &[u8]) -> Vec<u8> {
    debug_assert_eq!(data.len(), width_bytes as usize * rows as usize);
    let [xl, xh] = width_bytes.to_le_bytes();
    let [yl, yh] = rows.to_le_bytes();
    let mut out = Vec::with_capacity(8 + data.len());
    out.extend_from_slice(&[GS, b'v', b'0', 0, xl, xh, yl, yh]);
    out.extend_from_slice(data);
    out
}

/// Split a packed bitmap into `GS v 0` commands of at most `band_height` rows.
///
/// Printers with small receive buffers drop data when one command carries a
/// very tall image.
pub fn raster(width_bytes: u16, rows: u32, data: &[u8], band_height: u32) -> Vec<u8> {
    let row_len = width_bytes as usize;
    let band_height = band_height.clamp(1, u16::MAX as u32);
    let mut out = Vec::with_capacity(data.len() + 8 * (rows / band_height + 1) as usize);

    let mut row = 0u32;
    while row < rows {
        let band = (rows - row).min(band_height);
        let start = row as usize * row_len;
        let end = start + band as usize * row_len;
        out.extend(raster_band(width_bytes, band as u16, &data[start..end]));
        row += band;
    }
    out
}
