//! Inverse-colormap filling: nearest palette entry per histogram cell.
//!
//! Candidate entries for a small update box of cells are pruned with
//! Heckbert's locally-sorted-search criterion, then the actual nearest
//! entry per cell is found with Thomas' incremental distance recurrence
//! (Graphics Gems II, III.1). Distances are measured in packed L*a*b*
//! space under the histogram axis scales.

use primitives::Color;

use crate::colormap::Triple;
use crate::histogram::{B_SCALE, G_SCALE, InverseMapGray, InverseMapRgb, R_SCALE};

/// log2(cells per axis) of the update box filled by one call. A single
/// cell per fill has proven the best tradeoff at full precision; larger
/// boxes only pay off when Heckbert pruning can reject more entries.
const BOX_R_LOG: usize = 0;
const BOX_G_LOG: usize = 0;
const BOX_B_LOG: usize = 0;

const BOX_R_ELEMS: usize = 1 << BOX_R_LOG;
const BOX_G_ELEMS: usize = 1 << BOX_G_LOG;
const BOX_B_ELEMS: usize = 1 << BOX_B_LOG;
const BOX_CELLS: usize = BOX_R_ELEMS * BOX_G_ELEMS * BOX_B_ELEMS;

/// Squared distance bounds from a palette entry to an update box along one
/// axis: (min over the box, max over the box). Only the box corners matter.
fn axis_span(x: i32, min: i32, max: i32, center: i32, scale: i32) -> (i32, i32) {
  if x < min {
    let near = (x - min) * scale;
    let far = (x - max) * scale;
    (near * near, far * far)
  } else if x > max {
    let near = (x - max) * scale;
    let far = (x - min) * scale;
    (near * near, far * far)
  } else {
    // Inside the range: no contribution to the minimum. Since the center
    // rounds down, the comparison must be <=.
    let far = if x <= center {
      (x - max) * scale
    } else {
      (x - min) * scale
    };
    (0, far * far)
  }
}

/// Heckbert pruning: every entry whose minimum distance to the box is not
/// larger than the smallest maximum distance is a candidate.
fn find_nearby_colors(clab: &[Triple], min_r: i32, min_g: i32, min_b: i32, shift: u32) -> Vec<usize> {
  let max_r = min_r + ((1 << (shift as usize + BOX_R_LOG)) - (1 << shift));
  let center_r = (min_r + max_r + 1) >> 1;
  let max_g = min_g + ((1 << (shift as usize + BOX_G_LOG)) - (1 << shift));
  let center_g = (min_g + max_g + 1) >> 1;
  let max_b = min_b + ((1 << (shift as usize + BOX_B_LOG)) - (1 << shift));
  let center_b = (min_b + max_b + 1) >> 1;

  let mut min_dist = vec![0i32; clab.len()];
  let mut minmax_dist = i32::MAX;

  for (i, entry) in clab.iter().enumerate() {
    let (rmin, rmax) = axis_span(entry.r, min_r, max_r, center_r, R_SCALE);
    let (gmin, gmax) = axis_span(entry.g, min_g, max_g, center_g, G_SCALE);
    let (bmin, bmax) = axis_span(entry.b, min_b, max_b, center_b, B_SCALE);
    min_dist[i] = rmin + gmin + bmin;
    let max_dist = rmax + gmax + bmax;
    if max_dist < minmax_dist {
      minmax_dist = max_dist;
    }
  }

  (0..clab.len())
    .filter(|&i| min_dist[i] <= minmax_dist)
    .collect()
}

/// Thomas incremental scan: nearest candidate for every cell of the update
/// box, walking the box with constant-difference distance updates.
fn find_best_colors(
  clab: &[Triple],
  min_r: i32,
  min_g: i32,
  min_b: i32,
  shift: u32,
  candidates: &[usize],
  best: &mut [usize; BOX_CELLS],
) {
  let step_r = (1 << shift) * R_SCALE;
  let step_g = (1 << shift) * G_SCALE;
  let step_b = (1 << shift) * B_SCALE;

  let mut best_dist = [i32::MAX; BOX_CELLS];

  for &icolor in candidates {
    let in_r = (min_r - clab[icolor].r) * R_SCALE;
    let in_g = (min_g - clab[icolor].g) * G_SCALE;
    let in_b = (min_b - clab[icolor].b) * B_SCALE;
    let start = in_r * in_r + in_g * in_g + in_b * in_b;

    let mut inc_r = in_r * (2 * step_r) + step_r * step_r;
    let mut cell = 0;
    let mut dist_r = start;
    for _ in 0..BOX_R_ELEMS {
      let mut dist_g = dist_r;
      let mut inc_g = in_g * (2 * step_g) + step_g * step_g;
      for _ in 0..BOX_G_ELEMS {
        let mut dist_b = dist_g;
        let mut inc_b = in_b * (2 * step_b) + step_b * step_b;
        for _ in 0..BOX_B_ELEMS {
          if dist_b < best_dist[cell] {
            best_dist[cell] = dist_b;
            best[cell] = icolor;
          }
          dist_b += inc_b;
          inc_b += 2 * step_b * step_b;
          cell += 1;
        }
        dist_g += inc_g;
        inc_g += 2 * step_g * step_g;
      }
      dist_r += inc_r;
      inc_r += 2 * step_r * step_r;
    }
  }
}

/// Fills the update box containing histogram cell `(r, g, b)` and returns
/// the nearest palette index for that cell.
pub(crate) fn fill_inverse_cmap_rgb(
  map: &mut InverseMapRgb,
  clab: &[Triple],
  (r, g, b): (usize, usize, usize),
) -> usize {
  let shift = map.shift();

  let box_r = r >> BOX_R_LOG;
  let box_g = g >> BOX_G_LOG;
  let box_b = b >> BOX_B_LOG;

  // Center coordinates of the box's origin cell, in packed sample units.
  let half = (1usize << shift) >> 1;
  let min_r = ((box_r << (shift as usize + BOX_R_LOG)) + half) as i32;
  let min_g = ((box_g << (shift as usize + BOX_G_LOG)) + half) as i32;
  let min_b = ((box_b << (shift as usize + BOX_B_LOG)) + half) as i32;

  let candidates = find_nearby_colors(clab, min_r, min_g, min_b, shift);

  let mut best = [0usize; BOX_CELLS];
  find_best_colors(clab, min_r, min_g, min_b, shift, &candidates, &mut best);

  let base_r = box_r << BOX_R_LOG;
  let base_g = box_g << BOX_G_LOG;
  let base_b = box_b << BOX_B_LOG;
  let mut cell = 0;
  for ir in 0..BOX_R_ELEMS {
    for ig in 0..BOX_G_ELEMS {
      for ib in 0..BOX_B_ELEMS {
        map.fill((base_r + ir, base_g + ig, base_b + ib), best[cell]);
        cell += 1;
      }
    }
  }

  best[((r - base_r) * BOX_G_ELEMS + (g - base_g)) * BOX_B_ELEMS + (b - base_b)]
}

/// Gray variant: a linear scan over the palette values.
pub(crate) fn fill_inverse_cmap_gray(
  map: &mut InverseMapGray,
  cmap: &[Color],
  pixel: usize,
) -> usize {
  debug_assert!(!cmap.is_empty());

  let mut min_dist = i64::MAX;
  let mut best = 0;
  for (i, c) in cmap.iter().enumerate() {
    let dist = (pixel as i64 - c.r as i64).abs();
    if dist < min_dist {
      min_dist = dist;
      best = i;
      if dist == 0 {
        break;
      }
    }
  }

  map.fill(pixel, best);
  best
}

/// Cached nearest lookup, filling the cache on a miss.
pub(crate) fn nearest_index_rgb(
  map: &mut InverseMapRgb,
  clab: &[Triple],
  coords: (usize, usize, usize),
) -> usize {
  match map.lookup(coords) {
    Some(index) => index,
    None => fill_inverse_cmap_rgb(map, clab, coords),
  }
}

/// Cached nearest lookup for gray sources.
pub(crate) fn nearest_index_gray(map: &mut InverseMapGray, cmap: &[Color], pixel: usize) -> usize {
  match map.lookup(pixel) {
    Some(index) => index,
    None => fill_inverse_cmap_gray(map, cmap, pixel),
  }
}
