//! The process-wide ordered-dither threshold matrix.
//!
//! The matrix is shared read-only by every conversion; a conversion takes
//! an `Arc` snapshot at start so pixel loops never touch the lock. The
//! installer is the single writer and must not run while a conversion is
//! in flight.

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

/// Width of the effective threshold matrix.
pub const DM_WIDTH: usize = 128;
/// Height of the effective threshold matrix.
pub const DM_HEIGHT: usize = 128;

const DM_WIDTH_MASK: i64 = (DM_WIDTH - 1) as i64;
const DM_HEIGHT_MASK: i64 = (DM_HEIGHT - 1) as i64;

/// A tiled threshold matrix; cell values are compared against 0..=255
/// samples.
pub(crate) struct DitherMatrix {
  cells: Box<[[u8; DM_HEIGHT]; DM_WIDTH]>,
}

impl DitherMatrix {
  /// Tiles a `width` x `height` matrix (column-major, `[x][y]` order)
  /// across the full store. Dimensions must divide the store extent.
  fn from_tile(tile: &[u8], width: usize, height: usize) -> Self {
    let mut cells = Box::new([[0u8; DM_HEIGHT]; DM_WIDTH]);
    for (x, column) in cells.iter_mut().enumerate() {
      for (y, cell) in column.iter_mut().enumerate() {
        *cell = tile[(x % width) * height + (y % height)];
      }
    }
    Self { cells }
  }

  /// The default matrix: a 16x16 Bayer matrix (thresholds 0..=255, each
  /// value appearing once) tiled across the store.
  fn bayer_default() -> Self {
    // Recursive doubling: M(2n) quadruples M(n) with offsets 0/2/3/1.
    let mut size = 1usize;
    let mut m = vec![0u32];
    while size < 16 {
      let next = size * 2;
      let mut doubled = vec![0u32; next * next];
      for y in 0..size {
        for x in 0..size {
          let v = 4 * m[y * size + x];
          doubled[y * next + x] = v;
          doubled[y * next + x + size] = v + 2;
          doubled[(y + size) * next + x] = v + 3;
          doubled[(y + size) * next + x + size] = v + 1;
        }
      }
      m = doubled;
      size = next;
    }

    // Column-major tile, matching the install layout.
    let mut tile = vec![0u8; 16 * 16];
    for x in 0..16 {
      for y in 0..16 {
        tile[x * 16 + y] = m[y * 16 + x] as u8;
      }
    }
    Self::from_tile(&tile, 16, 16)
  }

  /// Threshold at canvas coordinates; offsets may be negative.
  #[inline]
  pub fn threshold(&self, x: i64, y: i64) -> u8 {
    self.cells[(x & DM_WIDTH_MASK) as usize][(y & DM_HEIGHT_MASK) as usize]
  }
}

static MATRIX: Lazy<Mutex<Arc<DitherMatrix>>> =
  Lazy::new(|| Mutex::new(Arc::new(DitherMatrix::bayer_default())));

/// The matrix a starting conversion should use.
pub(crate) fn current_matrix() -> Arc<DitherMatrix> {
  MATRIX.lock().unwrap().clone()
}

/// Installs a replacement threshold matrix, tiled across the 128x128
/// store. `matrix` holds `width * height` cells in `[x][y]` (column-major)
/// order and both dimensions must divide 128; an empty matrix restores the
/// Bayer default. Must not be called while a conversion is running.
pub fn set_dither_matrix(matrix: &[u8], width: usize, height: usize) {
  if matrix.is_empty() || width == 0 || height == 0 {
    *MATRIX.lock().unwrap() = Arc::new(DitherMatrix::bayer_default());
    return;
  }

  if DM_WIDTH % width != 0 || DM_HEIGHT % height != 0 {
    log::warn!(
      "dither matrix {}x{} does not tile the {}x{} store; keeping the current matrix",
      width,
      height,
      DM_WIDTH,
      DM_HEIGHT
    );
    return;
  }
  if matrix.len() < width * height {
    log::warn!("dither matrix shorter than {}x{}; keeping the current matrix", width, height);
    return;
  }

  *MATRIX.lock().unwrap() = Arc::new(DitherMatrix::from_tile(matrix, width, height));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_thresholds_are_uniform() {
    let dm = DitherMatrix::bayer_default();
    let mut counts = [0u32; 256];
    for x in 0..DM_WIDTH {
      for y in 0..DM_HEIGHT {
        counts[dm.threshold(x as i64, y as i64) as usize] += 1;
      }
    }
    // Every threshold value appears equally often in the tiled store.
    assert!(counts.iter().all(|&c| c == 64));
    // Exactly half the cells exceed the midpoint.
    let above: u32 = counts[128..].iter().sum();
    assert_eq!(above, (DM_WIDTH * DM_HEIGHT) as u32 / 2);
  }

  #[test]
  fn threshold_wraps_negative_coordinates() {
    let dm = DitherMatrix::bayer_default();
    assert_eq!(dm.threshold(-1, -1), dm.threshold(127, 127));
    assert_eq!(dm.threshold(128, 3), dm.threshold(0, 3));
  }

  #[test]
  fn tile_install_repeats_cells() {
    let dm = DitherMatrix::from_tile(&[0, 64, 128, 192], 2, 2);
    assert_eq!(dm.threshold(0, 0), 0);
    assert_eq!(dm.threshold(0, 1), 64);
    assert_eq!(dm.threshold(1, 0), 128);
    assert_eq!(dm.threshold(1, 1), 192);
    assert_eq!(dm.threshold(2, 2), 0);
  }
}
