//! RGB pass-2 variants. These also serve gray layers mapped against the
//! fixed palettes, with the Y' byte replicated across the channels.

use canvas::{Layer, ProgressSink, Region};
use primitives::Color;

use crate::error::ConvertError;
use crate::histogram::InverseMapRgb;
use crate::inverse::nearest_index_rgb;

use super::{IndexedImage, Pass2Ctx, error_limit_16, fetch_rgb, is_transparent};

/// Weighted sRGB distance used to apportion the ordered-dither mix. The
/// linear-space variant is barely distinguishable and much slower.
fn dist_srgb(c: Color, r: u8, g: u8, b: u8) -> i32 {
  let dr = (c.r as i32 - r as i32) as f64;
  let dg = (c.g as i32 - g as i32) as f64;
  let db = (c.b as i32 - b as i32) as f64;
  (30.0 * dr * dr + 59.0 * dg * dg + 11.0 * db * db).sqrt() as i32
}

/// Plain nearest-color mapping through the inverse-cmap cache.
pub(crate) fn map_no_dither_rgb(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapRgb,
  layer: &dyn Layer,
  progress: &mut dyn ProgressSink,
) -> IndexedImage {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let gray_source = format.is_gray();
  let (off_x, off_y) = layer.offset();
  let shift = inv.shift();

  let src = layer.read_buffer(&Region::of_extent(width, height));
  let mut out = IndexedImage::new(width, height, has_alpha);
  let out_bpp = out.bpp();

  for y in 0..height {
    for x in 0..width {
      let px = &src[(y * width + x) * bpp..][..bpp];
      let pos = (y * width + x) * out_bpp;

      if has_alpha {
        let transparent = is_transparent(
          px[bpp - 1],
          ctx.dither_alpha,
          ctx.dm,
          x as i64 + off_x as i64,
          y as i64 + off_y as i64,
        );
        if transparent {
          continue;
        }
        out.data[pos + 1] = 255;
      }

      let (r, g, b) = fetch_rgb(px, gray_source);
      let coords = ctx.tables.rgb_to_lin(r, g, b, shift);
      let index = nearest_index_rgb(inv, &ctx.cmap.clab, coords);
      out.data[pos] = index as u8;
      ctx.index_used[index] += 1;
    }

    if y % 16 == 0 {
      progress.set_value(y as f64 / height as f64);
    }
  }

  out
}

/// Positional dithering: find a second candidate by extrapolating the
/// error vector away from the nearest match, then let the threshold
/// matrix arbitrate between the two in proportion to their errors.
pub(crate) fn map_fixed_dither_rgb(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapRgb,
  layer: &dyn Layer,
) -> IndexedImage {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let gray_source = format.is_gray();
  let (off_x, off_y) = layer.offset();
  let shift = inv.shift();
  let ncolors = ctx.cmap.len();

  let src = layer.read_buffer(&Region::of_extent(width, height));
  let mut out = IndexedImage::new(width, height, has_alpha);
  let out_bpp = out.bpp();

  for y in 0..height {
    for x in 0..width {
      let px = &src[(y * width + x) * bpp..][..bpp];
      let pos = (y * width + x) * out_bpp;
      let dmval =
        ctx.dm.threshold(x as i64 + off_x as i64, y as i64 + off_y as i64) as i32;

      if has_alpha {
        let transparent = is_transparent(
          px[bpp - 1],
          ctx.dither_alpha,
          ctx.dm,
          x as i64 + off_x as i64,
          y as i64 + off_y as i64,
        );
        if transparent {
          continue;
        }
        out.data[pos + 1] = 255;
      }

      let (r, g, b) = fetch_rgb(px, gray_source);
      let coords = ctx.tables.rgb_to_lin(r, g, b, shift);
      let mut pixval1 = nearest_index_rgb(inv, &ctx.cmap.clab, coords);
      let mut color1 = ctx.cmap.cmap[pixval1];
      let mut pixval2 = pixval1;

      if ncolors > 2 {
        // Walk along the error vector until the walk reaches a different
        // color cell or leaves the cube.
        let re = r as i32 - color1.r as i32;
        let ge = g as i32 - color1.g as i32;
        let be = b as i32 - color1.b as i32;
        let mut rv = r as i32 + re;
        let mut gv = g as i32 + ge;
        let mut bv = b as i32 + be;
        loop {
          let coords = ctx.tables.rgb_to_lin(
            rv.clamp(0, 255) as u8,
            gv.clamp(0, 255) as u8,
            bv.clamp(0, 255) as u8,
            shift,
          );
          pixval2 = nearest_index_rgb(inv, &ctx.cmap.clab, coords);
          rv += re;
          gv += ge;
          bv += be;
          if pixval1 != pixval2 {
            break;
          }
          if !(0..=255).contains(&rv) || !(0..=255).contains(&gv) || !(0..=255).contains(&bv) {
            break;
          }
          if re == 0 && ge == 0 && be == 0 {
            break;
          }
        }
      } else {
        // Not enough colors to hunt for an alternative; the other entry
        // is it.
        pixval2 = (pixval1 + 1) % ncolors;
      }

      // Sort the pair so the dither range never inverts its viewpoint;
      // unsorted pairs show up as artifacts in 1-bit dithers.
      if pixval1 > pixval2 {
        std::mem::swap(&mut pixval1, &mut pixval2);
        color1 = ctx.cmap.cmap[pixval1];
      }
      let color2 = ctx.cmap.cmap[pixval2];

      let err1 = dist_srgb(color1, r, g, b);
      let err2 = dist_srgb(color2, r, g, b);
      let mut index = pixval1;
      if err1 != 0 || err2 != 0 {
        let proportion2 = (255 * err2) / (err1 + err2);
        if dmval > proportion2 {
          index = pixval2;
        }
      }

      out.data[pos] = index as u8;
      ctx.index_used[index] += 1;
    }
  }

  out
}

/// Rolling state of the Floyd-Steinberg pass: the palette's linear gamut
/// bounds plus one pair of error rows per channel. Rows are `width + 2`
/// long so the boundary taps never need special-casing.
struct FsRgb<'a, 'b> {
  ctx: &'a mut Pass2Ctx<'b>,
  inv: &'a mut InverseMapRgb,
  low_bleed: bool,
  width: usize,
  bpp: usize,
  out_bpp: usize,
  has_alpha: bool,
  gray_source: bool,
  off_x: i64,
  off_y: i64,
  shift: u32,
  r_lo: i32,
  r_hi: i32,
  g_lo: i32,
  g_hi: i32,
  b_lo: i32,
  b_hi: i32,
  r_prev: Vec<i32>,
  r_next: Vec<i32>,
  g_prev: Vec<i32>,
  g_next: Vec<i32>,
  b_prev: Vec<i32>,
  b_next: Vec<i32>,
}

impl<'a, 'b> FsRgb<'a, 'b> {
  /// One serpentine row. `LTR` selects the direction; the tap layout is
  /// mirrored through `fwd`/`back` below.
  fn row<const LTR: bool>(&mut self, y: usize, src: &[u8], out: &mut [u8]) {
    // The cells the first pixel's taps touch must start clean; the 1/16
    // tap then initializes the rest of the next row as the scan advances.
    if LTR {
      self.r_next[0] = 0;
      self.r_next[1] = 0;
      self.g_next[0] = 0;
      self.g_next[1] = 0;
      self.b_next[0] = 0;
      self.b_next[1] = 0;
      for x in 0..self.width {
        self.pixel::<LTR>(x, y, src, out);
      }
    } else {
      self.r_next[self.width + 1] = 0;
      self.r_next[self.width] = 0;
      self.g_next[self.width + 1] = 0;
      self.g_next[self.width] = 0;
      self.b_next[self.width + 1] = 0;
      self.b_next[self.width] = 0;
      for x in (0..self.width).rev() {
        self.pixel::<LTR>(x, y, src, out);
      }
    }

    std::mem::swap(&mut self.r_prev, &mut self.r_next);
    std::mem::swap(&mut self.g_prev, &mut self.g_next);
    std::mem::swap(&mut self.b_prev, &mut self.b_next);
  }

  fn pixel<const LTR: bool>(&mut self, x: usize, y: usize, src: &[u8], out: &mut [u8]) {
    let i = x + 1;
    let (fwd, back) = if LTR { (i + 1, i - 1) } else { (i - 1, i + 1) };
    let px = &src[x * self.bpp..][..self.bpp];
    let pos = x * self.out_bpp;

    if self.has_alpha {
      let transparent = is_transparent(
        px[self.bpp - 1],
        self.ctx.dither_alpha,
        self.ctx.dm,
        x as i64 + self.off_x,
        y as i64 + self.off_y,
      );
      if transparent {
        // Drop the incoming error and keep the next row's fresh cell
        // initialized.
        self.r_next[fwd] = 0;
        self.g_next[fwd] = 0;
        self.b_next[fwd] = 0;
        return;
      }
      out[pos + 1] = 255;
    }

    let (r, g, b) = fetch_rgb(px, self.gray_source);
    let (lin_r, lin_g, lin_b) = self.ctx.tables.rgb_to_linear(r, g, b);

    let mut re = lin_r + error_limit_16(self.low_bleed, self.r_prev[i]);
    let mut ge = lin_g + error_limit_16(self.low_bleed, self.g_prev[i]);
    let mut be = lin_b + error_limit_16(self.low_bleed, self.b_prev[i]);

    // Hard-clamp the corrected value to the palette's attainable gamut so
    // the error cannot continuously accelerate outside it.
    re = re.clamp(self.r_lo, self.r_hi);
    ge = ge.clamp(self.g_lo, self.g_hi);
    be = be.clamp(self.b_lo, self.b_hi);

    let (sr, sg, sb) = self.ctx.tables.linear_to_srgb_u8(re, ge, be);
    let coords = self.ctx.tables.rgb_to_lin(sr, sg, sb, self.shift);
    let index = nearest_index_rgb(self.inv, &self.ctx.cmap.clab, coords);

    out[pos] = index as u8;
    self.ctx.index_used[index] += 1;

    let lin = self.ctx.cmap.clin[index];
    let re = re - lin.r;
    let ge = ge - lin.g;
    let be = be - lin.b;

    self.r_prev[fwd] += (7 * re) >> 4;
    self.g_prev[fwd] += (7 * ge) >> 4;
    self.b_prev[fwd] += (7 * be) >> 4;

    self.r_next[back] += (3 * re) >> 4;
    self.g_next[back] += (3 * ge) >> 4;
    self.b_next[back] += (3 * be) >> 4;

    self.r_next[i] += (5 * re) >> 4;
    self.g_next[i] += (5 * ge) >> 4;
    self.b_next[i] += (5 * be) >> 4;

    self.r_next[fwd] = re >> 4;
    self.g_next[fwd] = ge >> 4;
    self.b_next[fwd] = be >> 4;
  }
}

/// Serpentine Floyd-Steinberg in linear light with error limiting and
/// palette-gamut clamping.
pub(crate) fn map_fs_dither_rgb(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapRgb,
  layer: &dyn Layer,
  low_bleed: bool,
  progress: &mut dyn ProgressSink,
) -> Result<IndexedImage, ConvertError> {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let has_alpha = format.has_alpha();
  let (off_x, off_y) = layer.offset();

  let mut out = IndexedImage::new(width, height, has_alpha);
  let out_bpp = out.bpp();

  // Bounding box of the palette in linear light.
  let (mut r_lo, mut r_hi) = (i32::MAX, i32::MIN);
  let (mut g_lo, mut g_hi) = (i32::MAX, i32::MIN);
  let (mut b_lo, mut b_hi) = (i32::MAX, i32::MIN);
  for lin in &ctx.cmap.clin {
    r_lo = r_lo.min(lin.r);
    r_hi = r_hi.max(lin.r);
    g_lo = g_lo.min(lin.g);
    g_hi = g_hi.max(lin.g);
    b_lo = b_lo.min(lin.b);
    b_hi = b_hi.max(lin.b);
  }

  let shift = inv.shift();
  let mut fs = FsRgb {
    ctx,
    inv,
    low_bleed,
    width,
    bpp: format.bytes_per_pixel(),
    out_bpp,
    has_alpha,
    gray_source: format.is_gray(),
    off_x: off_x as i64,
    off_y: off_y as i64,
    shift,
    r_lo,
    r_hi,
    g_lo,
    g_hi,
    b_lo,
    b_hi,
    r_prev: vec![0; width + 2],
    r_next: vec![0; width + 2],
    g_prev: vec![0; width + 2],
    g_next: vec![0; width + 2],
    b_prev: vec![0; width + 2],
    b_next: vec![0; width + 2],
  };

  for y in 0..height {
    let src = layer.read_buffer(&Region::row(y, width));
    let row = &mut out.data[y * width * out_bpp..(y + 1) * width * out_bpp];
    if y % 2 == 1 {
      fs.row::<false>(y, &src, row);
    } else {
      fs.row::<true>(y, &src, row);
    }

    if y % 16 == 0 {
      progress.set_value(y as f64 / height as f64);
      if progress.check_cancel() {
        return Err(ConvertError::Cancelled);
      }
    }
  }

  Ok(out)
}

/// Exact lookup for palettes known to contain every source color verbatim.
/// A run of identical pixels hits the one-entry cache.
pub(crate) fn map_nodestruct_rgb(ctx: &mut Pass2Ctx, layer: &dyn Layer) -> IndexedImage {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let gray_source = format.is_gray();
  let (off_x, off_y) = layer.offset();

  let src = layer.read_buffer(&Region::of_extent(width, height));
  let mut out = IndexedImage::new(width, height, has_alpha);
  let out_bpp = out.bpp();

  let mut last: Option<(u8, u8, u8)> = None;
  let mut last_index = 0usize;

  for y in 0..height {
    for x in 0..width {
      let px = &src[(y * width + x) * bpp..][..bpp];
      let pos = (y * width + x) * out_bpp;

      if has_alpha {
        let transparent = is_transparent(
          px[bpp - 1],
          ctx.dither_alpha,
          ctx.dm,
          x as i64 + off_x as i64,
          y as i64 + off_y as i64,
        );
        if transparent {
          continue;
        }
        out.data[pos + 1] = 255;
      }

      let (r, g, b) = fetch_rgb(px, gray_source);
      if last != Some((r, g, b)) {
        match ctx
          .cmap
          .cmap
          .iter()
          .position(|c| c.r == r && c.g == g && c.b == b)
        {
          Some(index) => {
            last = Some((r, g, b));
            last_index = index;
          }
          None => panic!(
            "color ({}, {}, {}) was expected to be in the non-destructive colormap",
            r, g, b
          ),
        }
      }

      out.data[pos] = last_index as u8;
      ctx.index_used[last_index] += 1;
    }
  }

  out
}
