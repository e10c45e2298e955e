//! Pass 1: histogram population across the input layers.

use canvas::{Layer, ProgressSink, Region};
use primitives::Color;

use crate::dither::DitherMatrix;
use crate::histogram::{HistogramGray, HistogramRgb};
use crate::tables::ConvertTables;

/// Facts collected about the source while the histogram builds.
pub(crate) struct BuildStats {
  /// Distinct sRGB triples seen so far, capped at the palette limit.
  pub found: Vec<Color>,
  /// More distinct colors exist than the cap allows; `found` is void and a
  /// real quantization pass is required.
  pub exceeded: bool,
  pub had_white: bool,
  pub had_black: bool,
}

impl BuildStats {
  pub fn new() -> Self {
    Self {
      found: Vec::new(),
      exceeded: false,
      had_white: false,
      had_black: false,
    }
  }

  fn note_extremes(&mut self, r: u8, g: u8, b: u8) {
    if r == 255 && g == 255 && b == 255 {
      self.had_white = true;
    }
    if r == 0 && g == 0 && b == 0 {
      self.had_black = true;
    }
  }
}

/// Scans one layer into the RGB histogram, tracking the exact-color list
/// until it overflows `col_limit`.
pub(crate) fn generate_histogram_rgb(
  hist: &mut HistogramRgb,
  stats: &mut BuildStats,
  tables: &ConvertTables,
  layer: &dyn Layer,
  col_limit: usize,
  dither_alpha: bool,
  dm: &DitherMatrix,
  progress: &mut dyn ProgressSink,
) {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let gray_source = format.is_gray();
  let (off_x, off_y) = layer.offset();
  let shift = hist.shift();

  let src = layer.read_buffer(&Region::of_extent(width, height));

  progress.set_value(0.0);

  for y in 0..height {
    for x in 0..width {
      let px = &src[(y * width + x) * bpp..][..bpp];

      if has_alpha {
        // Alpha dithering must be deterministic w.r.t. canvas offsets so
        // pass 2 sees exactly the pixels counted here.
        let transparent = if dither_alpha {
          px[bpp - 1] < dm.threshold(x as i64 + off_x as i64, y as i64 + off_y as i64)
        } else {
          px[bpp - 1] <= 127
        };
        if transparent {
          continue;
        }
      }

      let (r, g, b) = if gray_source {
        (px[0], px[0], px[0])
      } else {
        (px[0], px[1], px[2])
      };

      hist.count(tables.rgb_to_lin(r, g, b, shift));
      stats.note_extremes(r, g, b);

      if !stats.exceeded {
        let color = Color::from_rgb(r, g, b);
        if !stats.found.contains(&color) {
          if stats.found.len() >= col_limit {
            // More colors in the image than were allowed; switch to plain
            // histogram statistics with a view to quantizing later.
            stats.exceeded = true;
          } else {
            stats.found.push(color);
          }
        }
      }
    }

    if y % 16 == 0 {
      progress.set_value(y as f64 / height as f64);
    }
  }
}

/// Scans one layer into the 1-D gray histogram. No exact-color tracking;
/// a 256-entry palette already covers every possible value.
pub(crate) fn generate_histogram_gray(
  hist: &mut HistogramGray,
  layer: &dyn Layer,
  dither_alpha: bool,
  dm: &DitherMatrix,
) {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let (off_x, off_y) = layer.offset();

  let src = layer.read_buffer(&Region::of_extent(width, height));

  for y in 0..height {
    for x in 0..width {
      let px = &src[(y * width + x) * bpp..][..bpp];

      if has_alpha {
        let transparent = if dither_alpha {
          px[bpp - 1] < dm.threshold(x as i64 + off_x as i64, y as i64 + off_y as i64)
        } else {
          px[bpp - 1] <= 127
        };
        if transparent {
          continue;
        }
      }

      hist.count(px[0] as usize);
    }
  }
}
