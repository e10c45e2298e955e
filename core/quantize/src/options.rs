//! Options controlling one indexed conversion.

use primitives::Palette;

/// How the target palette is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteMode {
  /// Build an optimal palette from the image with median cut.
  Generate,
  /// The 216-entry web-safe cube.
  Web,
  /// Black and white only.
  Mono,
  /// A caller-supplied palette (truncated to 256 entries).
  Custom,
}

/// Dithering applied while mapping pixels onto the palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DitherMode {
  /// Plain nearest-color mapping.
  None,
  /// Serpentine Floyd-Steinberg in linear light, hard error clamp.
  FloydSteinberg,
  /// Serpentine Floyd-Steinberg in linear light, soft error limiting.
  FloydSteinbergLowBleed,
  /// Positional ordered dithering between the two best palette matches.
  FixedOrdered,
  /// Exact lookup for images whose colors are all in the palette already.
  Nodestruct,
}

/// Options for one indexed conversion.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
  pub palette_mode: PaletteMode,
  /// Palette size limit; must be in 2..=256.
  pub max_colors: usize,
  /// Collapse duplicate palette entries and drop unused ones after mapping
  /// (WEB and CUSTOM palettes only).
  pub remove_duplicates: bool,
  pub dither_mode: DitherMode,
  /// Dither partial transparency against the threshold matrix instead of
  /// hard-thresholding at 50%.
  pub dither_alpha: bool,
  /// Quantize text layers like any other layer; when false the host routes
  /// them through its own pipeline.
  pub dither_text_layers: bool,
  pub custom_palette: Option<Palette>,
  /// Histogram bits per axis, 1..=8. Memory/quality tradeoff.
  pub precision: u32,
}

impl Default for ConvertOptions {
  fn default() -> Self {
    Self {
      palette_mode: PaletteMode::Generate,
      max_colors: 256,
      remove_duplicates: true,
      dither_mode: DitherMode::None,
      dither_alpha: false,
      dither_text_layers: false,
      custom_palette: None,
      precision: 8,
    }
  }
}
