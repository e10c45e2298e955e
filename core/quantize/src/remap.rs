//! Collapsing duplicate and unused palette entries after mapping.

use primitives::Color;
use rayon::prelude::*;

use crate::pass2::IndexedImage;

/// Builds a compacted palette from the entries actually used, folds
/// duplicate colors together, ranks the survivors by usage (heaviest
/// first) and returns them with the 256-entry index translation table.
pub(crate) fn make_remap_table(old: &[Color], index_used: &[u64; 256]) -> (Vec<Color>, [u8; 256]) {
  let n = old.len();
  let mut temp_pal = vec![Color::black(); n];
  let mut temp_use = vec![0u64; n];
  let mut transmap = vec![usize::MAX; n];

  // First pass: collect only the entries marked as used at all.
  let mut used = 0;
  for i in 0..n {
    if index_used[i] != 0 {
      temp_pal[used] = old[i];
      temp_use[used] = index_used[i];
      transmap[i] = used;
      used += 1;
    }
  }

  // Second pass: fold duplicates, moving the usage tally onto the
  // surviving entry and redirecting mappings from the dead one.
  for i in 0..used {
    for j in 0..i {
      if temp_pal[i] == temp_pal[j] && temp_use[i] != 0 && temp_use[j] != 0 {
        temp_use[i] += temp_use[j];
        temp_use[j] = 0;
        for entry in transmap.iter_mut() {
          if *entry == j {
            *entry = i;
          }
        }
      }
    }
  }

  // Third pass: rank the survivors to the front, heaviest use first.
  // The sort is stable, so equal counts keep their palette order.
  let mut ranked: Vec<(usize, u64)> = (0..used).map(|i| (i, temp_use[i])).collect();
  ranked.sort_by(|a, b| b.1.cmp(&a.1));

  let survivors = ranked.iter().filter(|&&(_, count)| count != 0).count();

  let mut remap = [0u8; 256];
  for i in 0..n {
    if index_used[i] != 0 {
      if let Some(rank) = ranked
        .iter()
        .position(|&(initial, count)| initial == transmap[i] && count != 0)
      {
        remap[i] = rank as u8;
      }
    }
  }

  let mut new_palette = vec![Color::black(); survivors];
  for i in 0..n {
    if index_used[i] != 0 {
      new_palette[remap[i] as usize] = old[i];
    }
  }

  (new_palette, remap)
}

/// Rewrites every staged index image through the translation table.
/// Transparent pixels are forced to index 0. Purely data-parallel, so the
/// staged layers fan out across threads.
pub(crate) fn remap_staged(staged: &mut [Option<IndexedImage>], remap: &[u8; 256]) {
  staged.par_iter_mut().for_each(|image| {
    let Some(image) = image else { return };
    if image.has_alpha {
      for px in image.data.chunks_exact_mut(2) {
        if px[1] != 0 {
          px[0] = remap[px[0] as usize];
        } else {
          px[0] = 0;
        }
      }
    } else {
      for px in image.data.iter_mut() {
        *px = remap[*px as usize];
      }
    }
  });
}
