//! Indexed-color PNG encoding for resolved tile pixel buffers.

use anyhow::{Context, Result, ensure};

use crate::coords::TILE_PIXELS;
use crate::palette::tile_palette;

/// Encode a tile's palette-index buffer as an 8-bit indexed PNG.
///
/// The buffer must already be exactly one byte per pixel of a full tile;
/// the reader rejects records with any other size.
pub fn encode_tile_png(pixels: &[u8]) -> Result<Vec<u8>> {
    let side = TILE_PIXELS as u32;
    ensure!(
        pixels.len() == (side * side) as usize,
        "pixel buffer holds {} bytes, expected {}",
        pixels.len(),
        side * side
    );

    let palette = tile_palette();
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, side, side);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette.plte.as_slice());
    encoder.set_trns(palette.trns.as_slice());
    let mut writer = encoder.write_header().context("writing tile PNG header")?;
    writer
        .write_image_data(pixels)
        .context("writing tile PNG data")?;
    writer.finish().context("finishing tile PNG")?;
    Ok(out)
}
