//! End-to-end conversions through the public API.

use canvas::{Layer, MemoryLayer, ProgressSink};
use primitives::{BaseType, Color, Palette, PixelFormat};
use primitives::color::to_lab::srgb_u8_to_linear_u16;
use quantize::{ConvertError, ConvertOptions, DitherMode, PaletteMode, convert_indexed};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rgb_layer(width: usize, height: usize, pixels: Vec<u8>) -> MemoryLayer {
  MemoryLayer::from_pixels("layer", width, height, PixelFormat::Rgb8, pixels)
}

fn gray_layer(width: usize, height: usize, pixels: Vec<u8>) -> MemoryLayer {
  MemoryLayer::from_pixels("layer", width, height, PixelFormat::Gray8, pixels)
}

fn convert_one(
  layer: &mut MemoryLayer,
  base_type: BaseType,
  options: &ConvertOptions,
) -> Result<Palette, ConvertError> {
  let mut layers: Vec<&mut dyn Layer> = vec![layer];
  convert_indexed(base_type, &mut layers, options, None)
}

#[test]
fn four_distinct_colors_become_the_palette() {
  #[rustfmt::skip]
  let pixels = vec![
    255, 0, 0,   0, 255, 0,
    0, 0, 255,   255, 255, 255,
  ];
  let mut layer = rgb_layer(2, 2, pixels);
  let options = ConvertOptions {
    max_colors: 4,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  // The lossless shortcut keeps the exact colors, ordered by luminance.
  assert_eq!(
    palette.colors(),
    &[
      Color::from_rgb(0, 0, 255),
      Color::from_rgb(255, 0, 0),
      Color::from_rgb(0, 255, 0),
      Color::from_rgb(255, 255, 255),
    ]
  );
  assert_eq!(layer.indexed().unwrap(), &[1, 2, 0, 3]);
}

#[test]
fn reconverting_an_exact_image_is_the_identity() {
  #[rustfmt::skip]
  let pixels = vec![
    10, 200, 30,   10, 200, 30,
    200, 10, 30,   30, 10, 200,
  ];
  let mut layer = rgb_layer(2, 2, pixels);
  let options = ConvertOptions {
    max_colors: 8,
    ..ConvertOptions::default()
  };
  let palette1 = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();
  let indexed1 = layer.indexed().unwrap().to_vec();

  // Render the indexed result back to RGB and convert again.
  let rendered: Vec<u8> = indexed1
    .iter()
    .flat_map(|&i| {
      let c = palette1.get(i as usize).unwrap();
      [c.r, c.g, c.b]
    })
    .collect();
  let mut layer2 = rgb_layer(2, 2, rendered);
  let palette2 = convert_one(&mut layer2, BaseType::Rgb, &options).unwrap();

  assert_eq!(palette1, palette2);
  assert_eq!(layer2.indexed().unwrap(), &indexed1[..]);
}

#[test]
fn mono_fs_ramp_darkens_to_lightens_monotonically() {
  let mut pixels = Vec::with_capacity(256 * 3);
  for x in 0..256u32 {
    pixels.extend([x as u8, x as u8, x as u8]);
  }
  let mut layer = rgb_layer(256, 1, pixels);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Mono,
    dither_mode: DitherMode::FloydSteinberg,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();
  assert_eq!(palette, Palette::mono());

  let indexed = layer.indexed().unwrap();
  assert_eq!(indexed[0], 0);
  assert_eq!(indexed[255], 1);

  let counts: Vec<usize> = indexed
    .chunks(32)
    .map(|chunk| chunk.iter().filter(|&&i| i == 1).count())
    .collect();
  for pair in counts.windows(2) {
    assert!(pair[1] + 2 >= pair[0], "white density regressed: {:?}", counts);
  }
  assert!(counts[0] < counts[7], "ramp ends should differ: {:?}", counts);
}

#[test]
fn ordered_dither_halves_a_mid_gray() {
  let pixels = vec![128u8; 32 * 32 * 3];
  let mut layer = rgb_layer(32, 32, pixels);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Mono,
    dither_mode: DitherMode::FixedOrdered,
    ..ConvertOptions::default()
  };
  convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  let whites = layer.indexed().unwrap().iter().filter(|&&i| i == 1).count();
  assert_eq!(whites, 32 * 32 / 2);
}

#[test]
fn ordered_dither_halves_a_mid_gray_in_gray_mode() {
  let pixels = vec![128u8; 32 * 32];
  let mut layer = gray_layer(32, 32, pixels);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Mono,
    dither_mode: DitherMode::FixedOrdered,
    ..ConvertOptions::default()
  };
  convert_one(&mut layer, BaseType::Gray, &options).unwrap();

  let whites = layer.indexed().unwrap().iter().filter(|&&i| i == 1).count();
  assert_eq!(whites, 32 * 32 / 2);
}

#[test]
fn nodestruct_reproduces_the_source_exactly() {
  let mut pixels = Vec::new();
  for y in 0..8 {
    for x in 0..8 {
      let v = if (x + y) % 2 == 0 { 0u8 } else { 255 };
      pixels.extend([v, v, v]);
    }
  }
  let mut layer = rgb_layer(8, 8, pixels.clone());
  let options = ConvertOptions {
    palette_mode: PaletteMode::Custom,
    dither_mode: DitherMode::Nodestruct,
    remove_duplicates: false,
    custom_palette: Some(Palette::mono()),
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  let rendered: Vec<u8> = layer
    .indexed()
    .unwrap()
    .iter()
    .flat_map(|&i| {
      let c = palette.get(i as usize).unwrap();
      [c.r, c.g, c.b]
    })
    .collect();
  assert_eq!(rendered, pixels);
}

#[test]
fn duplicate_remapper_ranks_by_usage() {
  let a = Color::from_rgb(255, 0, 0);
  let b = Color::from_rgb(0, 255, 0);
  let c = Color::from_rgb(0, 0, 255);
  let d = Color::from_rgb(255, 255, 0);
  let e = Color::from_rgb(0, 255, 255);
  // Entry 5 duplicates entry 3; entries 4 and 7 go unused.
  let custom = Palette::from_colors(vec![
    b,
    a,
    d,
    c,
    Color::from_rgb(128, 0, 128),
    c,
    e,
    Color::white(),
  ]);

  // Usage: a x6, b x4, c x3, d x2, e x1.
  let mut source = Vec::new();
  for (color, count) in [(a, 6), (b, 4), (c, 3), (d, 2), (e, 1)] {
    for _ in 0..count {
      source.extend([color.r, color.g, color.b]);
    }
  }
  let mut layer = rgb_layer(4, 4, source);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Custom,
    remove_duplicates: true,
    custom_palette: Some(custom),
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  // Unused and duplicate entries are gone, survivors ranked by usage.
  assert_eq!(palette.colors(), &[a, b, c, d, e]);

  let indexed = layer.indexed().unwrap();
  let mut counts = [0usize; 5];
  for &i in indexed {
    assert!((i as usize) < palette.len());
    counts[i as usize] += 1;
  }
  assert_eq!(counts, [6, 4, 3, 2, 1]);
}

fn tile_mean_linear(values: &[u16], width: usize, tile_x: usize, tile_y: usize) -> f64 {
  let mut sum = 0.0;
  for y in 0..16 {
    for x in 0..16 {
      sum += values[(tile_y * 16 + y) * width + tile_x * 16 + x] as f64;
    }
  }
  sum / 256.0
}

fn assert_fs_preserves_tile_means(
  dither_mode: DitherMode,
  value_at: impl Fn(usize) -> u8,
  tolerance: f64,
) {
  let width = 64;
  let height = 64;
  let mut pixels = Vec::with_capacity(width * height * 3);
  for _y in 0..height {
    for x in 0..width {
      let v = value_at(x);
      pixels.extend([v, v, v]);
    }
  }
  let mut layer = rgb_layer(width, height, pixels.clone());
  let options = ConvertOptions {
    palette_mode: PaletteMode::Custom,
    dither_mode,
    remove_duplicates: false,
    custom_palette: Some(Palette::mono()),
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  let source_linear: Vec<u16> = pixels
    .chunks(3)
    .map(|px| srgb_u8_to_linear_u16(px[0]))
    .collect();
  let output_linear: Vec<u16> = layer
    .indexed()
    .unwrap()
    .iter()
    .map(|&i| srgb_u8_to_linear_u16(palette.get(i as usize).unwrap().r))
    .collect();

  for ty in 0..height / 16 {
    for tx in 0..width / 16 {
      let wanted = tile_mean_linear(&source_linear, width, tx, ty);
      let got = tile_mean_linear(&output_linear, width, tx, ty);
      assert!(
        (wanted - got).abs() <= tolerance,
        "tile ({tx},{ty}): wanted {wanted:.0}, got {got:.0}"
      );
    }
  }
}

#[test]
fn fs_dither_preserves_tile_means() {
  // Full-range gradient; the plain clamp almost never engages against a
  // black/white palette, so tile means track closely.
  assert_fs_preserves_tile_means(DitherMode::FloydSteinberg, |x| 32 + 3 * x as u8, 750.0);
}

#[test]
fn fs_low_bleed_preserves_tile_means_in_shadows() {
  // Dim gradient only: the soft limiter caps corrections hard, which a
  // two-entry palette exercises constantly once emissions become dense.
  assert_fs_preserves_tile_means(
    DitherMode::FloydSteinbergLowBleed,
    |x| 8 + (x / 2) as u8,
    900.0,
  );
}

#[test]
fn fully_transparent_image_yields_transparent_output() {
  let mut pixels = Vec::new();
  for i in 0..64u32 {
    pixels.extend([i as u8, (i * 3) as u8, (i * 5) as u8, 0]);
  }
  let mut layer = MemoryLayer::from_pixels("layer", 8, 8, PixelFormat::Rgba8, pixels);
  let palette = convert_one(&mut layer, BaseType::Rgb, &ConvertOptions::default()).unwrap();

  assert!(palette.len() >= 1);
  for pair in layer.indexed().unwrap().chunks(2) {
    assert_eq!(pair, &[0, 0]);
  }
}

#[test]
fn half_transparent_image_keeps_opaque_pixels() {
  #[rustfmt::skip]
  let pixels = vec![
    200, 10, 10, 255,   0, 0, 0, 0,
    200, 10, 10, 255,   9, 9, 9, 40,
  ];
  let mut layer = MemoryLayer::from_pixels("layer", 2, 2, PixelFormat::Rgba8, pixels);
  let palette = convert_one(&mut layer, BaseType::Rgb, &ConvertOptions::default()).unwrap();

  assert_eq!(palette.colors(), &[Color::from_rgb(200, 10, 10)]);
  assert_eq!(layer.indexed().unwrap(), &[0, 255, 0, 0, 0, 255, 0, 0]);
}

#[test]
fn lone_white_pixel_snaps_into_the_palette() {
  let grays = [
    100u8, 106, 112, 118, 124, 130, 136, 142, 148, 154, 160, 166, 172,
  ];
  let mut pixels = Vec::with_capacity(64 * 3);
  for i in 0..63 {
    let v = grays[i % grays.len()];
    pixels.extend([v, v, v]);
  }
  pixels.extend([255, 255, 255]);
  let mut layer = rgb_layer(8, 8, pixels);
  let options = ConvertOptions {
    max_colors: 8,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  assert!(palette.len() <= 8);
  assert!(
    palette.colors().contains(&Color::white()),
    "white was not preserved: {:?}",
    palette.colors()
  );
}

#[test]
fn gray_generate_recovers_distinct_values() {
  let values = [10u8, 80, 160, 240];
  let mut pixels = Vec::with_capacity(16 * 16);
  for i in 0..256 {
    pixels.push(values[i % 4]);
  }
  let mut layer = gray_layer(16, 16, pixels.clone());
  let options = ConvertOptions {
    max_colors: 4,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Gray, &options).unwrap();

  assert_eq!(
    palette.colors(),
    &[
      Color::from_rgb(10, 10, 10),
      Color::from_rgb(80, 80, 80),
      Color::from_rgb(160, 160, 160),
      Color::from_rgb(240, 240, 240),
    ]
  );
  for (i, &v) in pixels.iter().enumerate() {
    let index = layer.indexed().unwrap()[i] as usize;
    assert_eq!(palette.get(index).unwrap().r, v);
  }
}

#[test]
fn gray_mono_fs_dither_completes_on_gradients() {
  let mut pixels = Vec::with_capacity(16 * 16);
  for y in 0..16 {
    for x in 0..16 {
      pixels.push((x * 16 + y) as u8);
    }
  }
  let mut layer = gray_layer(16, 16, pixels);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Mono,
    dither_mode: DitherMode::FloydSteinbergLowBleed,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Gray, &options).unwrap();
  assert_eq!(palette, Palette::mono());
  assert!(layer.indexed().unwrap().iter().all(|&i| i < 2));
}

#[test]
fn gray_source_maps_through_web_palette() {
  let mut layer = gray_layer(2, 1, vec![0, 255]);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Web,
    remove_duplicates: true,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Gray, &options).unwrap();

  assert_eq!(palette.colors(), &[Color::black(), Color::white()]);
  assert_eq!(layer.indexed().unwrap(), &[0, 1]);
}

#[test]
fn web_palette_without_remapping_keeps_216_entries() {
  let mut layer = rgb_layer(2, 1, vec![0, 0, 0, 255, 255, 255]);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Web,
    remove_duplicates: false,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();
  assert_eq!(palette.len(), 216);
  assert_eq!(layer.indexed().unwrap(), &[0, 215]);
}

#[test]
fn multiple_layers_share_one_palette() {
  let mut red = rgb_layer(2, 2, vec![200, 0, 0].repeat(4));
  let mut blue = rgb_layer(2, 2, vec![0, 0, 200].repeat(4));
  let mut layers: Vec<&mut dyn Layer> = vec![&mut red, &mut blue];
  let options = ConvertOptions {
    max_colors: 4,
    ..ConvertOptions::default()
  };
  let palette = convert_indexed(BaseType::Rgb, &mut layers, &options, None).unwrap();

  assert_eq!(
    palette.colors(),
    &[Color::from_rgb(0, 0, 200), Color::from_rgb(200, 0, 0)]
  );
  assert_eq!(red.indexed().unwrap(), &[1, 1, 1, 1]);
  assert_eq!(blue.indexed().unwrap(), &[0, 0, 0, 0]);
}

#[test]
fn text_layers_are_left_to_the_host() {
  let mut text = rgb_layer(2, 1, vec![1, 2, 3, 4, 5, 6]);
  text.set_text_layer(true);
  let mut plain = rgb_layer(2, 1, vec![9, 9, 9, 9, 9, 9]);
  let mut layers: Vec<&mut dyn Layer> = vec![&mut text, &mut plain];
  let palette = convert_indexed(BaseType::Rgb, &mut layers, &ConvertOptions::default(), None)
    .unwrap();

  assert!(text.indexed().is_none());
  assert!(plain.indexed().is_some());
  // Text-layer colors still joined the histogram statistics.
  assert!(palette.len() >= 3);
}

#[test]
fn single_pixel_fs_dither_completes() {
  let mut layer = rgb_layer(1, 1, vec![128, 128, 128]);
  let options = ConvertOptions {
    palette_mode: PaletteMode::Mono,
    dither_mode: DitherMode::FloydSteinberg,
    ..ConvertOptions::default()
  };
  convert_one(&mut layer, BaseType::Rgb, &options).unwrap();
  assert!(layer.indexed().unwrap()[0] < 2);
}

#[test]
fn random_noise_respects_palette_bounds() {
  let mut rng = StdRng::seed_from_u64(7);
  let pixels: Vec<u8> = (0..32 * 32 * 3).map(|_| rng.random()).collect();
  let mut layer = rgb_layer(32, 32, pixels);
  let options = ConvertOptions {
    max_colors: 16,
    dither_mode: DitherMode::FloydSteinbergLowBleed,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();

  assert!(palette.len() <= 16);
  assert!(palette.len() >= 2);
  for &i in layer.indexed().unwrap() {
    assert!((i as usize) < palette.len());
  }
}

struct CancelAfter {
  checks: usize,
  after: usize,
}

impl ProgressSink for CancelAfter {
  fn set_text(&mut self, _text: &str) {}

  fn set_value(&mut self, _fraction: f64) {}

  fn check_cancel(&mut self) -> bool {
    self.checks += 1;
    self.checks > self.after
  }
}

#[test]
fn cancellation_leaves_layers_untouched() {
  let mut layer = rgb_layer(4, 4, vec![77; 4 * 4 * 3]);
  let mut sink = CancelAfter { checks: 0, after: 0 };
  let mut layers: Vec<&mut dyn Layer> = vec![&mut layer];
  let result = convert_indexed(
    BaseType::Rgb,
    &mut layers,
    &ConvertOptions::default(),
    Some(&mut sink),
  );

  assert!(matches!(result, Err(ConvertError::Cancelled)));
  assert!(layer.indexed().is_none());
}

struct StageRecorder {
  texts: Vec<String>,
}

impl ProgressSink for StageRecorder {
  fn set_text(&mut self, text: &str) {
    self.texts.push(text.to_string());
  }

  fn set_value(&mut self, _fraction: f64) {}
}

#[test]
fn progress_reports_stages() {
  let mut layer = rgb_layer(4, 4, vec![10; 4 * 4 * 3]);
  let mut sink = StageRecorder { texts: Vec::new() };
  let mut layers: Vec<&mut dyn Layer> = vec![&mut layer];
  convert_indexed(
    BaseType::Rgb,
    &mut layers,
    &ConvertOptions::default(),
    Some(&mut sink),
  )
  .unwrap();

  assert!(sink.texts.iter().any(|t| t.contains("stage 2")));
  assert!(sink.texts.iter().any(|t| t.contains("stage 3")));
}

#[test]
fn validation_errors() {
  let mut layer = rgb_layer(1, 1, vec![0, 0, 0]);

  let mut layers: Vec<&mut dyn Layer> = vec![&mut layer];
  assert!(matches!(
    convert_indexed(BaseType::Indexed, &mut layers, &ConvertOptions::default(), None),
    Err(ConvertError::AlreadyIndexed)
  ));

  let options = ConvertOptions {
    palette_mode: PaletteMode::Custom,
    custom_palette: None,
    ..ConvertOptions::default()
  };
  let mut layers: Vec<&mut dyn Layer> = vec![&mut layer];
  assert!(matches!(
    convert_indexed(BaseType::Rgb, &mut layers, &options, None),
    Err(ConvertError::PaletteEmpty)
  ));

  let options = ConvertOptions {
    precision: 9,
    ..ConvertOptions::default()
  };
  let mut layers: Vec<&mut dyn Layer> = vec![&mut layer];
  assert!(matches!(
    convert_indexed(BaseType::Rgb, &mut layers, &options, None),
    Err(ConvertError::PrecisionUnsupported(9))
  ));
}

#[test]
fn reduced_precision_still_converts() {
  let mut rng = StdRng::seed_from_u64(11);
  let pixels: Vec<u8> = (0..16 * 16 * 3).map(|_| rng.random()).collect();
  let mut layer = rgb_layer(16, 16, pixels);
  let options = ConvertOptions {
    max_colors: 8,
    precision: 6,
    ..ConvertOptions::default()
  };
  let palette = convert_one(&mut layer, BaseType::Rgb, &options).unwrap();
  assert!(palette.len() <= 8);
  for &i in layer.indexed().unwrap() {
    assert!((i as usize) < palette.len());
  }
}

#[test]
fn offsets_shift_the_alpha_dither_pattern() {
  // With alpha dithering on, the same layer content at different offsets
  // must sample different threshold cells.
  let pixels = {
    let mut p = Vec::new();
    for _ in 0..64 {
      p.extend([100, 100, 100, 128]);
    }
    p
  };
  let mut at_origin = MemoryLayer::from_pixels("a", 8, 8, PixelFormat::Rgba8, pixels.clone());
  let mut shifted = MemoryLayer::from_pixels("b", 8, 8, PixelFormat::Rgba8, pixels);
  shifted.set_offset(3, 5);

  let options = ConvertOptions {
    dither_alpha: true,
    ..ConvertOptions::default()
  };
  convert_one(&mut at_origin, BaseType::Rgb, &options).unwrap();
  convert_one(&mut shifted, BaseType::Rgb, &options).unwrap();

  let a: Vec<u8> = at_origin.indexed().unwrap().iter().skip(1).step_by(2).copied().collect();
  let b: Vec<u8> = shifted.indexed().unwrap().iter().skip(1).step_by(2).copied().collect();
  assert_ne!(a, b, "offset did not influence the alpha dither pattern");
  // Alpha 128 keeps roughly half the pixels in both cases.
  let opaque = a.iter().filter(|&&v| v == 255).count();
  assert!(opaque > 16 && opaque < 48, "unexpected opaque count {opaque}");
}
