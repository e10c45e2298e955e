//! Error type for indexed conversions.

use primitives::PixelFormat;

/// Errors that can occur during an indexed conversion.
///
/// The engine never partially publishes: whenever one of these is returned,
/// no layer has been written.
#[derive(Debug)]
pub enum ConvertError {
  /// The palette mode requires a custom palette and none, or an empty one,
  /// was supplied.
  PaletteEmpty,
  /// The image is already indexed.
  AlreadyIndexed,
  /// The requested histogram precision is outside the supported range.
  PrecisionUnsupported(u32),
  /// The color bridge cannot service a participating layer's pixel format.
  ColorSpaceUnavailable(PixelFormat),
  /// The progress sink requested cancellation.
  Cancelled,
}

impl std::fmt::Display for ConvertError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConvertError::PaletteEmpty => write!(f, "Cannot convert image: palette is empty"),
      ConvertError::AlreadyIndexed => write!(f, "Image is already indexed"),
      ConvertError::PrecisionUnsupported(bits) => {
        write!(f, "Unsupported histogram precision: {} bits per axis", bits)
      }
      ConvertError::ColorSpaceUnavailable(format) => {
        write!(f, "No color-space conversion available for {:?} layers", format)
      }
      ConvertError::Cancelled => write!(f, "Conversion cancelled"),
    }
  }
}

impl std::error::Error for ConvertError {}
