//! Pass 2: mapping layer pixels onto the finished palette.

pub(crate) mod gray;
pub(crate) mod rgb;

use crate::colormap::Colormap;
use crate::dither::DitherMatrix;
use crate::tables::ConvertTables;

/// A staged index image for one layer. Nothing is written back to a layer
/// until every layer has mapped successfully.
pub(crate) struct IndexedImage {
  pub width: usize,
  pub height: usize,
  pub has_alpha: bool,
  /// One index byte per pixel, or `(index, alpha)` pairs with alpha.
  /// Transparent pixels keep index 0.
  pub data: Vec<u8>,
}

impl IndexedImage {
  pub fn new(width: usize, height: usize, has_alpha: bool) -> Self {
    let bpp = if has_alpha { 2 } else { 1 };
    Self {
      width,
      height,
      has_alpha,
      data: vec![0u8; width * height * bpp],
    }
  }

  pub fn bpp(&self) -> usize {
    if self.has_alpha { 2 } else { 1 }
  }
}

/// State shared by every pass-2 variant while one layer maps.
pub(crate) struct Pass2Ctx<'a> {
  pub tables: &'a ConvertTables<'a>,
  pub cmap: &'a Colormap,
  pub dm: &'a DitherMatrix,
  pub dither_alpha: bool,
  pub index_used: &'a mut [u64; 256],
}

/// The Floyd-Steinberg error limiter over 16-bit linear errors. Low bleed
/// passes small errors through, halves the slope up to twice the knee and
/// flattens beyond; high bleed is a plain clamp. Without a limiter,
/// repeated errors in one direction build into fringes and stray bright
/// pixels.
pub(crate) fn error_limit_16(low_bleed: bool, error: i32) -> i32 {
  if low_bleed {
    let sign = if error < 0 { -1 } else { 1 };
    let val = error.abs();
    if val < 24 * 256 {
      sign * val
    } else if val < 24 * 2 * 256 {
      sign * ((val - 24 * 256) / 2 + 24 * 256)
    } else {
      sign * 24 * 2 * 256
    }
  } else {
    error.clamp(-192 * 256, 192 * 256)
  }
}

/// Transparency decision shared by every variant. `x` and `y` are canvas
/// coordinates (layer offsets applied).
#[inline]
pub(crate) fn is_transparent(
  alpha: u8,
  dither_alpha: bool,
  dm: &DitherMatrix,
  x: i64,
  y: i64,
) -> bool {
  if dither_alpha {
    alpha < dm.threshold(x, y)
  } else {
    alpha <= 127
  }
}

/// Source channel fetch; gray sources are replicated across RGB so the
/// fixed palettes can drive gray layers through the RGB passes.
#[inline]
pub(crate) fn fetch_rgb(px: &[u8], gray_source: bool) -> (u8, u8, u8) {
  if gray_source {
    (px[0], px[0], px[0])
  } else {
    (px[0], px[1], px[2])
  }
}
