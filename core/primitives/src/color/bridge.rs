use super::to_lab;
use crate::format::PixelFormat;

/// The set of callable color-space conversions a conversion engine needs.
///
/// Implementations must be deterministic for identical inputs and must not
/// cache per-call state between pixels. A bridge may be shared between
/// conversions once initialized.
pub trait ColorBridge: Send + Sync {
  /// Converts an sRGB triple to CIE L*a*b*.
  fn srgb_to_lab(&self, r: u8, g: u8, b: u8) -> (f32, f32, f32);
  /// Converts an sRGB triple to linear-light u16 channels.
  fn srgb_to_linear_u16(&self, r: u8, g: u8, b: u8) -> (u16, u16, u16);
  /// Converts linear-light u16 channels back to sRGB floats in 0..=1.
  fn linear_u16_to_srgb(&self, r: u16, g: u16, b: u16) -> (f32, f32, f32);
  /// Converts a CIE L*a*b* color to an sRGB triple, clamped to gamut.
  fn lab_to_srgb(&self, l: f32, a: f32, b: f32) -> (u8, u8, u8);
  /// Converts a Y' byte to linear-light u16.
  fn gray_to_linear_u16(&self, y: u8) -> u16 {
    self.srgb_to_linear_u16(y, y, y).0
  }
  /// Converts linear-light u16 back to a Y' float in 0..=1.
  fn linear_u16_to_gray(&self, y: u16) -> f32 {
    let (g, _, _) = self.linear_u16_to_srgb(y, y, y);
    g
  }
  /// Whether the bridge can service layers of the given pixel format.
  fn supports(&self, _format: PixelFormat) -> bool {
    true
  }
}

/// The built-in bridge: sRGB with the D65 white point.
#[derive(Clone, Copy, Debug, Default)]
pub struct SrgbBridge;

impl ColorBridge for SrgbBridge {
  fn srgb_to_lab(&self, r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    to_lab::rgb_to_lab(r, g, b)
  }

  fn srgb_to_linear_u16(&self, r: u8, g: u8, b: u8) -> (u16, u16, u16) {
    (
      to_lab::srgb_u8_to_linear_u16(r),
      to_lab::srgb_u8_to_linear_u16(g),
      to_lab::srgb_u8_to_linear_u16(b),
    )
  }

  fn linear_u16_to_srgb(&self, r: u16, g: u16, b: u16) -> (f32, f32, f32) {
    (
      to_lab::linear_u16_to_srgb_f32(r),
      to_lab::linear_u16_to_srgb_f32(g),
      to_lab::linear_u16_to_srgb_f32(b),
    )
  }

  fn lab_to_srgb(&self, l: f32, a: f32, b: f32) -> (u8, u8, u8) {
    to_lab::lab_to_rgb(l, a, b)
  }
}
