//! The conversion orchestrator: validation, pass 1, pass 2 and palette
//! post-processing, with every layer write staged until the whole
//! conversion has succeeded.

use canvas::{Layer, NullProgress, ProgressSink, Region};
use primitives::{BaseType, Color, ColorBridge, Palette, SrgbBridge};

use crate::builder::{self, BuildStats};
use crate::colormap::Colormap;
use crate::cut;
use crate::dither;
use crate::error::ConvertError;
use crate::histogram::{HistogramGray, HistogramRgb, InverseMapGray, InverseMapRgb};
use crate::options::{ConvertOptions, DitherMode, PaletteMode};
use crate::pass2::{self, IndexedImage, Pass2Ctx};
use crate::remap;
use crate::tables::ConvertTables;

/// One pass-2 strategy, chosen once per conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SecondPass {
  NoDitherRgb,
  FixedRgb,
  FsRgb { low_bleed: bool },
  NodestructRgb,
  NoDitherGray,
  FixedGray,
  FsGray { low_bleed: bool },
}

enum Hist {
  Rgb(HistogramRgb),
  Gray(HistogramGray),
}

enum Inverse {
  Rgb(InverseMapRgb),
  Gray(InverseMapGray),
  None,
}

fn select_second_pass(gray_pipeline: bool, dither_mode: DitherMode) -> SecondPass {
  if gray_pipeline {
    match dither_mode {
      DitherMode::None => SecondPass::NoDitherGray,
      DitherMode::FloydSteinberg => SecondPass::FsGray { low_bleed: false },
      DitherMode::FloydSteinbergLowBleed => SecondPass::FsGray { low_bleed: true },
      DitherMode::FixedOrdered => SecondPass::FixedGray,
      DitherMode::Nodestruct => {
        log::warn!("nodestruct mapping is not available for gray pipelines; using none");
        SecondPass::NoDitherGray
      }
    }
  } else {
    match dither_mode {
      DitherMode::None => SecondPass::NoDitherRgb,
      DitherMode::FloydSteinberg => SecondPass::FsRgb { low_bleed: false },
      DitherMode::FloydSteinbergLowBleed => SecondPass::FsRgb { low_bleed: true },
      DitherMode::FixedOrdered => SecondPass::FixedRgb,
      DitherMode::Nodestruct => SecondPass::NodestructRgb,
    }
  }
}

/// Converts `layers` to indexed color with the built-in sRGB bridge.
///
/// On success every non-skipped layer has received its index buffer and
/// the palette is returned for the host to publish together with the
/// base-type change. On error (including cancellation) no layer has been
/// touched.
pub fn convert_indexed(
  base_type: BaseType,
  layers: &mut [&mut dyn Layer],
  options: &ConvertOptions,
  progress: Option<&mut dyn ProgressSink>,
) -> Result<Palette, ConvertError> {
  convert_indexed_with_bridge(base_type, layers, options, &SrgbBridge, progress)
}

/// As [`convert_indexed`], with caller-supplied color-space conversions.
pub fn convert_indexed_with_bridge(
  base_type: BaseType,
  layers: &mut [&mut dyn Layer],
  options: &ConvertOptions,
  bridge: &dyn ColorBridge,
  progress: Option<&mut dyn ProgressSink>,
) -> Result<Palette, ConvertError> {
  if base_type == BaseType::Indexed {
    return Err(ConvertError::AlreadyIndexed);
  }
  assert!(
    (2..=256).contains(&options.max_colors),
    "max_colors must be in 2..=256"
  );
  if !(1..=8).contains(&options.precision) {
    return Err(ConvertError::PrecisionUnsupported(options.precision));
  }

  let custom_colors = if options.palette_mode == PaletteMode::Custom {
    match &options.custom_palette {
      Some(palette) if !palette.is_empty() => {
        Some(palette.colors().iter().copied().take(256).collect::<Vec<_>>())
      }
      _ => return Err(ConvertError::PaletteEmpty),
    }
  } else {
    None
  };

  for layer in layers.iter() {
    let format = layer.pixel_format();
    if !bridge.supports(format) {
      return Err(ConvertError::ColorSpaceUnavailable(format));
    }
  }

  // A 256-entry generated gray palette covers every value; mapping is the
  // identity and dithering would only add noise.
  let mut dither_mode = options.dither_mode;
  if base_type == BaseType::Gray
    && options.max_colors == 256
    && options.palette_mode == PaletteMode::Generate
  {
    dither_mode = DitherMode::None;
  }

  let mut null = NullProgress;
  let progress: &mut dyn ProgressSink = match progress {
    Some(p) => p,
    None => &mut null,
  };

  let dm = dither::current_matrix();
  let tables = ConvertTables::new(bridge);

  // Gray images with generated or mono palettes run the 1-D pipeline;
  // everything else (including gray sources against web/custom palettes)
  // goes through the RGB pipeline.
  let gray_pipeline = base_type == BaseType::Gray
    && matches!(options.palette_mode, PaletteMode::Generate | PaletteMode::Mono);

  let mut hist = if gray_pipeline {
    Hist::Gray(HistogramGray::new())
  } else {
    Hist::Rgb(HistogramRgb::new(options.precision))
  };

  // Pass 1: histogram across all layers, generated palettes only.
  let mut stats = BuildStats::new();
  if options.palette_mode == PaletteMode::Generate {
    progress.set_text("Converting to indexed colors");
    for layer in layers.iter() {
      match &mut hist {
        Hist::Gray(h) => {
          builder::generate_histogram_gray(h, &**layer, options.dither_alpha, &dm)
        }
        Hist::Rgb(h) => builder::generate_histogram_rgb(
          h,
          &mut stats,
          &tables,
          &**layer,
          options.max_colors,
          options.dither_alpha,
          &dm,
          progress,
        ),
      }
      if progress.check_cancel() {
        return Err(ConvertError::Cancelled);
      }
    }
  }

  progress.set_text("Converting to indexed colors (stage 2)");

  // If an RGB image asked for a generated, undithered palette and has no
  // more colors than the limit, the distinct colors *are* the palette and
  // there is no error to spread: skip quantization and remap losslessly.
  let exact_shortcut = base_type == BaseType::Rgb
    && options.palette_mode == PaletteMode::Generate
    && dither_mode == DitherMode::None
    && !stats.exceeded;

  let mut second_pass = select_second_pass(gray_pipeline, dither_mode);

  let mut cmap_colors: Vec<Color>;
  if exact_shortcut {
    cmap_colors = stats.found.clone();
    if cmap_colors.is_empty() {
      // Null or fully-transparent image; still publish one entry.
      cmap_colors.push(Color::black());
    }
    second_pass = SecondPass::NodestructRgb;
  } else {
    cmap_colors = match (&hist, options.palette_mode) {
      (Hist::Rgb(h), PaletteMode::Generate) => {
        let mut colors = cut::select_colors_rgb(&tables, h, options.max_colors, progress);
        cut::snap_to_black_and_white(
          &mut colors,
          options.max_colors,
          stats.had_white,
          stats.had_black,
        );
        colors
      }
      (Hist::Gray(h), PaletteMode::Generate) => cut::select_colors_gray(h, options.max_colors),
      (_, PaletteMode::Web) => Palette::web().colors().to_vec(),
      (_, PaletteMode::Mono) => Palette::mono().colors().to_vec(),
      (_, PaletteMode::Custom) => custom_colors.clone().unwrap_or_default(),
    };
  }

  if options.palette_mode == PaletteMode::Generate {
    cmap_colors.sort_by(|a, b| a.luminance().total_cmp(&b.luminance()));
  }

  progress.set_text("Converting to indexed colors (stage 3)");

  let mut colormap = Colormap::from_colors(cmap_colors);
  let mut index_used = Box::new([0u64; 256]);

  // Pass-2 init: rebuild the palette's companion views and flip the
  // histogram memory into the inverse cache. The nodestruct mapper needs
  // neither.
  let mut inverse = if second_pass == SecondPass::NodestructRgb {
    Inverse::None
  } else {
    colormap.rebuild_views(&tables);
    match hist {
      Hist::Rgb(h) => Inverse::Rgb(h.into_inverse()),
      Hist::Gray(h) => Inverse::Gray(h.into_inverse()),
    }
  };

  // Pass 2, serially per layer so the used counts are complete before the
  // remapper looks at them. Everything is staged; layers stay untouched
  // until the loop has finished.
  let total_layers = layers.len().max(1);
  let mut staged: Vec<Option<IndexedImage>> = Vec::with_capacity(layers.len());

  for (li, layer) in layers.iter().enumerate() {
    progress.set_value(li as f64 / total_layers as f64);

    if layer.is_text_layer() && !options.dither_text_layers {
      // The host arranges a separate pipeline for text layers.
      staged.push(None);
      continue;
    }

    let mut ctx = Pass2Ctx {
      tables: &tables,
      cmap: &colormap,
      dm: &dm,
      dither_alpha: options.dither_alpha,
      index_used: &mut *index_used,
    };

    let image = match (second_pass, &mut inverse) {
      (SecondPass::NoDitherRgb, Inverse::Rgb(inv)) => {
        pass2::rgb::map_no_dither_rgb(&mut ctx, inv, &**layer, progress)
      }
      (SecondPass::FixedRgb, Inverse::Rgb(inv)) => {
        pass2::rgb::map_fixed_dither_rgb(&mut ctx, inv, &**layer)
      }
      (SecondPass::FsRgb { low_bleed }, Inverse::Rgb(inv)) => {
        pass2::rgb::map_fs_dither_rgb(&mut ctx, inv, &**layer, low_bleed, progress)?
      }
      (SecondPass::NodestructRgb, _) => pass2::rgb::map_nodestruct_rgb(&mut ctx, &**layer),
      (SecondPass::NoDitherGray, Inverse::Gray(inv)) => {
        pass2::gray::map_no_dither_gray(&mut ctx, inv, &**layer)
      }
      (SecondPass::FixedGray, Inverse::Gray(inv)) => {
        pass2::gray::map_fixed_dither_gray(&mut ctx, inv, &**layer)
      }
      (SecondPass::FsGray { low_bleed }, Inverse::Gray(inv)) => {
        pass2::gray::map_fs_dither_gray(&mut ctx, inv, &**layer, low_bleed, progress)?
      }
      _ => unreachable!("second-pass dispatch out of sync with histogram state"),
    };
    staged.push(Some(image));

    if progress.check_cancel() {
      return Err(ConvertError::Cancelled);
    }
  }

  // Optional duplicate collapse; generated and mono palettes have nothing
  // to collapse.
  let mut palette_colors = colormap.cmap;
  if options.remove_duplicates
    && matches!(options.palette_mode, PaletteMode::Web | PaletteMode::Custom)
  {
    let (new_palette, table) = remap::make_remap_table(&palette_colors, &index_used);
    remap::remap_staged(&mut staged, &table);
    palette_colors = new_palette;
  }

  // Commit: only now do the layers change.
  for (layer, image) in layers.iter_mut().zip(staged) {
    let Some(image) = image else { continue };
    layer.write_indexed_buffer(&Region::of_extent(image.width, image.height), &image.data);
  }

  progress.set_value(1.0);

  Ok(Palette::from_colors(palette_colors))
}
