/// Pixel storage formats the conversion engine understands.
///
/// All formats are 8 bits per channel; higher precisions are converted by
/// the host before the engine sees the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  /// Three bytes per pixel: R', G', B'.
  Rgb8,
  /// Four bytes per pixel: R', G', B', A.
  Rgba8,
  /// One byte per pixel: Y'.
  Gray8,
  /// Two bytes per pixel: Y', A.
  GrayAlpha8,
}

impl PixelFormat {
  /// The storage width of one pixel.
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelFormat::Rgb8 => 3,
      PixelFormat::Rgba8 => 4,
      PixelFormat::Gray8 => 1,
      PixelFormat::GrayAlpha8 => 2,
    }
  }

  /// Whether the format carries an alpha channel.
  pub fn has_alpha(&self) -> bool {
    matches!(self, PixelFormat::Rgba8 | PixelFormat::GrayAlpha8)
  }

  /// Whether the format is single-channel Y'.
  pub fn is_gray(&self) -> bool {
    matches!(self, PixelFormat::Gray8 | PixelFormat::GrayAlpha8)
  }
}

/// The base type of the image a set of layers belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseType {
  /// Continuous-tone RGB.
  Rgb,
  /// Continuous-tone grayscale.
  Gray,
  /// Already palette-indexed.
  Indexed,
}
