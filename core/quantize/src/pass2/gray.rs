//! Grayscale pass-2 variants, used when a gray image maps onto a
//! generated or mono palette.

use canvas::{Layer, ProgressSink, Region};

use crate::error::ConvertError;
use crate::histogram::InverseMapGray;
use crate::inverse::nearest_index_gray;

use super::{IndexedImage, Pass2Ctx, error_limit_16, is_transparent};

/// Plain nearest-value mapping through the 1-D inverse cache.
pub(crate) fn map_no_dither_gray(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapGray,
  layer: &dyn Layer,
) -> IndexedImage {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let (off_x, off_y) = layer.offset();

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

      let index = nearest_index_gray(inv, &ctx.cmap.cmap, px[0] as usize);
      out.data[pos] = index as u8;
      ctx.index_used[index] += 1;
    }
  }

  out
}

/// 1-D positional dithering between the nearest value and the next color
/// cell reached by extrapolating the error.
pub(crate) fn map_fixed_dither_gray(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapGray,
  layer: &dyn Layer,
) -> IndexedImage {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let (off_x, off_y) = layer.offset();
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

      let pixel = px[0] as i32;
      let mut pixval1 = nearest_index_gray(inv, &ctx.cmap.cmap, pixel as usize);
      let mut pixval2 = pixval1;

      if ncolors > 2 {
        let re = pixel - ctx.cmap.cmap[pixval1].r as i32;
        let mut rv = pixel + re;
        loop {
          pixval2 = nearest_index_gray(inv, &ctx.cmap.cmap, rv.clamp(0, 255) as usize);
          rv += re;
          if pixval1 != pixval2 {
            break;
          }
          if !(0..=255).contains(&rv) || re == 0 {
            break;
          }
        }
      } else {
        // Not enough colors to bother looking for an alternative.
        pixval2 = (pixval1 + 1) % ncolors;
      }

      // Deterministic ordering, as in the RGB variant.
      if pixval1 > pixval2 {
        std::mem::swap(&mut pixval1, &mut pixval2);
      }

      let err1 = (ctx.cmap.cmap[pixval1].r as i32 - pixel).abs();
      let err2 = (ctx.cmap.cmap[pixval2].r as i32 - pixel).abs();
      let mut index = pixval1;
      if err1 != 0 || err2 != 0 {
        let proportion2 = (256 * 255 * err2) / (err1 + err2);
        if dmval * 256 > proportion2 {
          index = pixval2;
        }
      }

      out.data[pos] = index as u8;
      ctx.index_used[index] += 1;
    }
  }

  out
}

/// Serpentine Floyd-Steinberg over linear-light gray.
pub(crate) fn map_fs_dither_gray(
  ctx: &mut Pass2Ctx,
  inv: &mut InverseMapGray,
  layer: &dyn Layer,
  low_bleed: bool,
  progress: &mut dyn ProgressSink,
) -> Result<IndexedImage, ConvertError> {
  let (width, height) = (layer.width(), layer.height());
  let format = layer.pixel_format();
  let bpp = format.bytes_per_pixel();
  let has_alpha = format.has_alpha();
  let (off_x, off_y) = (layer.offset().0 as i64, layer.offset().1 as i64);

  let mut out = IndexedImage::new(width, height, has_alpha);
  let out_bpp = out.bpp();

  let mut prev = vec![0i32; width + 2];
  let mut next = vec![0i32; width + 2];

  for y in 0..height {
    let src = layer.read_buffer(&Region::row(y, width));
    let row = &mut out.data[y * width * out_bpp..(y + 1) * width * out_bpp];
    let odd = y % 2 == 1;

    if odd {
      next[width + 1] = 0;
      next[width] = 0;
    } else {
      next[0] = 0;
      next[1] = 0;
    }

    let mut pixel_at = |x: usize, prev: &mut [i32], next: &mut [i32]| {
      let i = x + 1;
      let (fwd, back) = if odd { (i - 1, i + 1) } else { (i + 1, i - 1) };
      let px = &src[x * bpp..][..bpp];
      let pos = x * out_bpp;

      if has_alpha {
        let transparent = is_transparent(
          px[bpp - 1],
          ctx.dither_alpha,
          ctx.dm,
          x as i64 + off_x,
          y as i64 + off_y,
        );
        if transparent {
          next[fwd] = 0;
          return;
        }
        row[pos + 1] = 255;
      }

      let mut pixel_lin = ctx.tables.gray_to_linear(px[0]) + error_limit_16(low_bleed, prev[i]);
      pixel_lin = pixel_lin.clamp(0, 65535);
      let pixel = ctx.tables.linear_to_gray_u8(pixel_lin);

      let index = nearest_index_gray(inv, &ctx.cmap.cmap, pixel as usize);
      row[pos] = index as u8;
      ctx.index_used[index] += 1;

      let err = pixel_lin - ctx.cmap.clin[index].r;
      prev[fwd] += (7 * err) >> 4;
      next[back] += (3 * err) >> 4;
      next[i] += (5 * err) >> 4;
      next[fwd] = err >> 4;
    };

    if odd {
      for x in (0..width).rev() {
        pixel_at(x, &mut prev, &mut next);
      }
    } else {
      for x in 0..width {
        pixel_at(x, &mut prev, &mut next);
      }
    }

    std::mem::swap(&mut prev, &mut next);

    if y % 16 == 0 {
      progress.set_value(y as f64 / height as f64);
      if progress.check_cancel() {
        return Err(ConvertError::Cancelled);
      }
    }
  }

  Ok(out)
}
