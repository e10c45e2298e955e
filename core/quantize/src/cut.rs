//! Median-cut palette construction over the color histogram.

use ndarray::s;
use primitives::Color;

use canvas::ProgressSink;

use crate::histogram::{B_SCALE, G_SCALE, HistogramGray, HistogramRgb, R_SCALE};
use crate::tables::ConvertTables;

/// Which histogram axis a split runs across.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
  Red,
  Green,
  Blue,
}

/// An axis-aligned box of histogram cells, tracked with the statistics the
/// split-selection needs. Bounds are inclusive bin coordinates.
#[derive(Clone, Debug, Default)]
pub(crate) struct CellBox {
  pub r_min: usize,
  pub r_max: usize,
  pub r_split: usize,
  pub g_min: usize,
  pub g_max: usize,
  pub g_split: usize,
  pub b_min: usize,
  pub b_max: usize,
  pub b_split: usize,
  /// 2-norm of the box extent; a box with volume 0 cannot be split.
  pub volume: i64,
  /// Pixels (not colors) inside the box.
  pub population: u64,
  pub r_error: u64,
  pub g_error: u64,
  pub b_error: u64,
}

/// Pixel-weighted mean of the box in sample units (bin coordinate scaled
/// back up by the histogram shift). `None` for an empty box.
fn mean_lin8(hist: &HistogramRgb, boxp: &CellBox) -> Option<(i64, i64, i64)> {
  let shift = hist.shift();
  let mut total = 0u64;
  let (mut r_total, mut g_total, mut b_total) = (0u64, 0u64, 0u64);

  let view = hist.cells().slice(s![
    boxp.r_min..=boxp.r_max,
    boxp.g_min..=boxp.g_max,
    boxp.b_min..=boxp.b_max
  ]);
  for ((ir, ig, ib), &freq) in view.indexed_iter() {
    if freq == 0 {
      continue;
    }
    total += freq;
    r_total += (boxp.r_min + ir) as u64 * freq;
    g_total += (boxp.g_min + ig) as u64 * freq;
    b_total += (boxp.b_min + ib) as u64 * freq;
  }

  if total == 0 {
    return None;
  }
  let half = total >> 1;
  Some((
    (((r_total << shift) + half) / total) as i64,
    (((g_total << shift) + half) / total) as i64,
    (((b_total << shift) + half) / total) as i64,
  ))
}

/// Shrinks the box to the smallest volume containing every nonzero cell,
/// then recomputes its volume, population, per-axis weighted error and
/// split points. `cells_remaining` caps how far an elongated box may shift
/// its split point off-center.
pub(crate) fn update_box_rgb(hist: &HistogramRgb, boxp: &mut CellBox, cells_remaining: usize) {
  let cells = hist.cells();
  let shift = hist.shift();

  let (mut r_min, mut r_max) = (boxp.r_min, boxp.r_max);
  let (mut g_min, mut g_max) = (boxp.g_min, boxp.g_max);
  let (mut b_min, mut b_max) = (boxp.b_min, boxp.b_max);

  // Inward scans along each face.
  if r_max > r_min {
    for r in r_min..=r_max {
      if cells
        .slice(s![r..=r, g_min..=g_max, b_min..=b_max])
        .iter()
        .any(|&c| c != 0)
      {
        r_min = r;
        break;
      }
    }
  }
  if r_max > r_min {
    for r in (r_min..=r_max).rev() {
      if cells
        .slice(s![r..=r, g_min..=g_max, b_min..=b_max])
        .iter()
        .any(|&c| c != 0)
      {
        r_max = r;
        break;
      }
    }
  }
  if g_max > g_min {
    for g in g_min..=g_max {
      if cells
        .slice(s![r_min..=r_max, g..=g, b_min..=b_max])
        .iter()
        .any(|&c| c != 0)
      {
        g_min = g;
        break;
      }
    }
  }
  if g_max > g_min {
    for g in (g_min..=g_max).rev() {
      if cells
        .slice(s![r_min..=r_max, g..=g, b_min..=b_max])
        .iter()
        .any(|&c| c != 0)
      {
        g_max = g;
        break;
      }
    }
  }
  if b_max > b_min {
    for b in b_min..=b_max {
      if cells
        .slice(s![r_min..=r_max, g_min..=g_max, b..=b])
        .iter()
        .any(|&c| c != 0)
      {
        b_min = b;
        break;
      }
    }
  }
  if b_max > b_min {
    for b in (b_min..=b_max).rev() {
      if cells
        .slice(s![r_min..=r_max, g_min..=g_max, b..=b])
        .iter()
        .any(|&c| c != 0)
      {
        b_max = b;
        break;
      }
    }
  }

  boxp.r_min = r_min;
  boxp.r_max = r_max;
  boxp.g_min = g_min;
  boxp.g_max = g_max;
  boxp.b_min = b_min;
  boxp.b_max = b_max;

  // 2-norm rather than real volume; this biases the method against long
  // narrow boxes. Extents are scaled back to sample units first.
  let dist0 = (((1 + r_max - r_min) << shift) * R_SCALE as usize) as i64;
  let dist1 = (((1 + g_max - g_min) << shift) * G_SCALE as usize) as i64;
  let dist2 = (((1 + b_max - b_min) << shift) * B_SCALE as usize) as i64;
  boxp.volume = dist0 * dist0 + dist1 * dist1 + dist2 * dist2;

  let (mean_r, mean_g, mean_b) = mean_lin8(hist, boxp).unwrap_or((0, 128, 128));

  // Per-axis weighted error: sum of freq * (cell - box mean)^2 over the
  // occupied cells, in sample units.
  let mut population = 0u64;
  let (mut r_error, mut g_error, mut b_error) = (0u64, 0u64, 0u64);
  let view = cells.slice(s![r_min..=r_max, g_min..=g_max, b_min..=b_max]);
  for ((ir, ig, ib), &freq) in view.indexed_iter() {
    if freq == 0 {
      continue;
    }
    let re = (((r_min + ir) << shift) as i64) - mean_r;
    let ge = (((g_min + ig) << shift) as i64) - mean_g;
    let be = (((b_min + ib) << shift) as i64) - mean_b;
    r_error += freq * (re * re) as u64;
    g_error += freq * (ge * ge) as u64;
    b_error += freq * (be * be) as u64;
    population += freq;
  }
  boxp.population = population;
  boxp.r_error = r_error;
  boxp.g_error = g_error;
  boxp.b_error = b_error;

  // Geometric split points, midway through each extent.
  boxp.r_split = r_min + (r_max - r_min + 1) / 2;
  boxp.g_split = g_min + (g_max - g_min + 1) / 2;
  boxp.b_split = b_min + (b_max - b_min + 1) / 2;

  // For a strongly elongated box, move the longest axis's split toward the
  // near end so early cuts peel off thin slices instead of halving.
  let mut longest_len = 0i64;
  let mut longest2 = 0i64;
  let mut longest_ax = None;
  for (dist, ax) in [(dist0, Axis::Red), (dist1, Axis::Green), (dist2, Axis::Blue)] {
    if dist >= longest_len {
      longest2 = longest_len;
      longest_len = dist;
      longest_ax = Some(ax);
    } else if dist >= longest2 {
      longest2 = dist;
    }
  }
  if longest2 == 0 {
    longest2 = 1;
  }
  let mut ratio = ((longest_len + longest2 / 2) / longest2) as usize;
  if ratio > cells_remaining + 1 {
    ratio = cells_remaining + 1;
  }
  if ratio > 2 {
    match longest_ax {
      Some(Axis::Red) => {
        let split = r_min + (r_max - r_min + ratio / 2) / ratio;
        if split < r_max {
          boxp.r_split = split;
        }
      }
      Some(Axis::Green) => {
        let split = g_min + (g_max - g_min + ratio / 2) / ratio;
        if split < g_max {
          boxp.g_split = split;
        }
      }
      Some(Axis::Blue) => {
        let split = b_min + (b_max - b_min + ratio / 2) / ratio;
        if split < b_max {
          boxp.b_split = split;
        }
      }
      None => log::warn!("no longest axis for elongated box"),
    }
  }

  // A split point sitting on the upper bound would produce an empty upper
  // half; reset it to the lower bound so both halves stay populated.
  if boxp.r_split == r_max {
    boxp.r_split = r_min;
  }
  if boxp.g_split == g_max {
    boxp.g_split = g_min;
  }
  if boxp.b_split == b_max {
    boxp.b_split = b_min;
  }
}

/// 1-D variant of `update_box_rgb` for grayscale histograms. The population
/// here counts occupied cells, and split points are not precomputed (the
/// gray cut always halves).
pub(crate) fn update_box_gray(hist: &HistogramGray, boxp: &mut CellBox) {
  let cells = hist.cells();
  let (mut min, mut max) = (boxp.r_min, boxp.r_max);

  if max > min {
    for i in min..=max {
      if cells[i] != 0 {
        min = i;
        break;
      }
    }
  }
  if max > min {
    for i in (min..=max).rev() {
      if cells[i] != 0 {
        max = i;
        break;
      }
    }
  }
  boxp.r_min = min;
  boxp.r_max = max;

  let dist = (max - min) as i64;
  boxp.volume = dist * dist;

  boxp.population = cells[min..=max].iter().filter(|&&c| c != 0).count() as u64;
}

/// Picks the box and axis with the greatest scaled weighted error, biasing
/// the first couple of cuts toward L* when the target palette is small.
/// `None` means no splittable box remains.
fn find_split_candidate(boxes: &[CellBox], desired_colors: usize) -> Option<(usize, Axis)> {
  const BIAS_FACTOR: f64 = 2.66;
  const BIAS_NUMBER: usize = 2;

  // The initial L-split bias only pays off when the final number of colors
  // is quite low; with more colors it comes out in the wash.
  let lbias = if desired_colors <= 16 && boxes.len() <= BIAS_NUMBER {
    (BIAS_NUMBER + 1 - boxes.len()) as f64 * BIAS_FACTOR / BIAS_NUMBER as f64
  } else {
    1.0
  };

  let mut max_err = 0.0f64;
  let mut which = None;
  for (i, boxp) in boxes.iter().enumerate() {
    if boxp.volume <= 0 {
      continue;
    }
    let rpe = boxp.r_error as f64 * (R_SCALE * R_SCALE) as f64;
    let gpe = boxp.g_error as f64 * (G_SCALE * G_SCALE) as f64;
    let bpe = boxp.b_error as f64 * (B_SCALE * B_SCALE) as f64;

    if lbias * rpe > max_err && boxp.r_min < boxp.r_max {
      which = Some((i, Axis::Red));
      max_err = lbias * rpe;
    }
    if gpe > max_err && boxp.g_min < boxp.g_max {
      which = Some((i, Axis::Green));
      max_err = gpe;
    }
    if bpe > max_err && boxp.b_min < boxp.b_max {
      which = Some((i, Axis::Blue));
      max_err = bpe;
    }
  }

  which
}

/// The splittable gray box with the largest volume, if any.
fn find_biggest_volume(boxes: &[CellBox]) -> Option<usize> {
  let mut max_volume = 0i64;
  let mut which = None;
  for (i, boxp) in boxes.iter().enumerate() {
    if boxp.volume > max_volume {
      which = Some(i);
      max_volume = boxp.volume;
    }
  }
  which
}

/// Repeatedly selects and splits boxes until `desired` are present or no
/// splittable box remains.
fn median_cut_rgb(
  hist: &HistogramRgb,
  boxes: &mut Vec<CellBox>,
  desired: usize,
  progress: &mut dyn ProgressSink,
) {
  while boxes.len() < desired {
    let Some((bi, axis)) = find_split_candidate(boxes, desired) else {
      break;
    };

    let mut upper = boxes[bi].clone();
    {
      let lower = &mut boxes[bi];
      match axis {
        Axis::Red => {
          let lb = lower.r_split;
          lower.r_max = lb;
          upper.r_min = lb + 1;
          debug_assert!(lower.r_max >= lower.r_min && upper.r_max >= upper.r_min);
        }
        Axis::Green => {
          let lb = lower.g_split;
          lower.g_max = lb;
          upper.g_min = lb + 1;
          debug_assert!(lower.g_max >= lower.g_min && upper.g_max >= upper.g_min);
        }
        Axis::Blue => {
          let lb = lower.b_split;
          lower.b_max = lb;
          upper.b_min = lb + 1;
          debug_assert!(lower.b_max >= lower.b_min && upper.b_max >= upper.b_min);
        }
      }
    }
    boxes.push(upper);

    let numboxes = boxes.len();
    if numboxes % 16 == 0 {
      progress.set_value(numboxes as f64 / desired as f64);
    }

    let cells_remaining = desired - numboxes;
    update_box_rgb(hist, &mut boxes[bi], cells_remaining);
    let last = numboxes - 1;
    update_box_rgb(hist, &mut boxes[last], cells_remaining);
  }
}

/// Gray cut: split the largest-volume box at its midpoint.
fn median_cut_gray(hist: &HistogramGray, boxes: &mut Vec<CellBox>, desired: usize) {
  while boxes.len() < desired {
    let Some(bi) = find_biggest_volume(boxes) else {
      break;
    };

    let mut upper = boxes[bi].clone();
    // Since the box has been shrunk to minimum volume, any split produces
    // two nonempty halves.
    let lb = (boxes[bi].r_max + boxes[bi].r_min) / 2;
    boxes[bi].r_max = lb;
    upper.r_min = lb + 1;
    boxes.push(upper);

    update_box_gray(hist, &mut boxes[bi]);
    let last = boxes.len() - 1;
    update_box_gray(hist, &mut boxes[last]);
  }
}

/// Pixel-weighted mean color of a finalized box, back in sRGB.
fn compute_color_rgb(tables: &ConvertTables, hist: &HistogramRgb, boxp: &CellBox) -> Color {
  let mut total = 0u64;
  let (mut r_total, mut g_total, mut b_total) = (0u64, 0u64, 0u64);

  let view = hist.cells().slice(s![
    boxp.r_min..=boxp.r_max,
    boxp.g_min..=boxp.g_max,
    boxp.b_min..=boxp.b_max
  ]);
  for ((ir, ig, ib), &freq) in view.indexed_iter() {
    if freq == 0 {
      continue;
    }
    total += freq;
    r_total += (boxp.r_min + ir) as u64 * freq;
    g_total += (boxp.g_min + ig) as u64 * freq;
    b_total += (boxp.b_min + ib) as u64 * freq;
  }

  if total > 0 {
    let (r, g, b) = tables.lin_to_rgb(
      r_total as f64 / total as f64,
      g_total as f64 / total as f64,
      b_total as f64 / total as f64,
      hist.elems(),
    );
    Color::from_rgb(r, g, b)
  } else {
    // Null or fully-transparent image; emit a placeholder entry.
    Color::black()
  }
}

/// Pixel-weighted mean value of a finalized gray box.
fn compute_color_gray(hist: &HistogramGray, boxp: &CellBox) -> Color {
  let mut total = 0u64;
  let mut g_total = 0u64;
  for (i, &count) in hist.cells()[boxp.r_min..=boxp.r_max].iter().enumerate() {
    if count != 0 {
      total += count;
      g_total += (boxp.r_min + i) as u64 * count;
    }
  }

  if total != 0 {
    let v = ((g_total + (total >> 1)) / total) as u8;
    Color::from_rgb(v, v, v)
  } else {
    Color::black()
  }
}

/// Master routine for RGB color selection: one box spanning the space,
/// median cut, then one representative color per box.
pub(crate) fn select_colors_rgb(
  tables: &ConvertTables,
  hist: &HistogramRgb,
  desired: usize,
  progress: &mut dyn ProgressSink,
) -> Vec<Color> {
  let top = hist.elems() - 1;
  let mut first = CellBox {
    r_max: top,
    g_max: top,
    b_max: top,
    ..CellBox::default()
  };
  update_box_rgb(hist, &mut first, desired);

  let mut boxes = Vec::with_capacity(desired);
  boxes.push(first);
  median_cut_rgb(hist, &mut boxes, desired, progress);

  boxes
    .iter()
    .map(|b| compute_color_rgb(tables, hist, b))
    .collect()
}

/// Master routine for grayscale color selection.
pub(crate) fn select_colors_gray(hist: &HistogramGray, desired: usize) -> Vec<Color> {
  let mut first = CellBox {
    r_max: 255,
    ..CellBox::default()
  };
  update_box_gray(hist, &mut first);

  let mut boxes = Vec::with_capacity(desired);
  boxes.push(first);
  median_cut_gray(hist, &mut boxes, desired);

  boxes.iter().map(|b| compute_color_gray(hist, b)).collect()
}

/// If the image contained pure white (or black) and the palette entry
/// nearest to it is within 128 units of squared sRGB distance, overwrite
/// that entry with the exact extreme.
pub(crate) fn snap_to_black_and_white(
  cmap: &mut [Color],
  max_colors: usize,
  had_white: bool,
  had_black: bool,
) {
  let mut whitest = 0;
  let mut blackest = 0;
  let mut white_dist = i64::MAX;
  let mut black_dist = i64::MAX;

  for (i, c) in cmap.iter().enumerate() {
    let dr = c.r as i64 - 255;
    let dg = c.g as i64 - 255;
    let db = c.b as i64 - 255;
    let dist = dr * dr + dg * dg + db * db;
    if dist < white_dist {
      white_dist = dist;
      whitest = i;
    }

    let dist = (c.r as i64).pow(2) + (c.g as i64).pow(2) + (c.b as i64).pow(2);
    if dist < black_dist {
      black_dist = dist;
      blackest = i;
    }
  }

  if max_colors > 2 && had_white && white_dist < 128 * 128 {
    cmap[whitest] = Color::white();
  }
  if max_colors > 2 && had_black && black_dist < 128 * 128 {
    cmap[blackest] = Color::black();
  }
}
