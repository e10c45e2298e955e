use crate::color::Color;

/// Maximum number of entries an indexed palette can hold.
pub const MAX_PALETTE_SIZE: usize = 256;

/// An ordered palette of up to 256 colors.
///
/// The wire format is packed RGB: `[R0, G0, B0, R1, G1, B1, …]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
  colors: Vec<Color>,
}

impl Palette {
  /// Creates an empty palette.
  pub fn new() -> Self {
    Self { colors: Vec::new() }
  }

  /// Creates a palette from a list of colors, truncated to 256 entries.
  pub fn from_colors(mut colors: Vec<Color>) -> Self {
    colors.truncate(MAX_PALETTE_SIZE);
    Self { colors }
  }

  /// Parses the packed `[R0,G0,B0,…]` wire format. Trailing bytes that do
  /// not form a full triple are ignored.
  pub fn from_bytes(bytes: &[u8]) -> Self {
    let colors = bytes
      .chunks_exact(3)
      .take(MAX_PALETTE_SIZE)
      .map(|c| Color::from_rgb(c[0], c[1], c[2]))
      .collect();
    Self { colors }
  }

  /// Serializes to the packed wire format (`3 * len()` bytes).
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(self.colors.len() * 3);
    for c in &self.colors {
      bytes.push(c.r);
      bytes.push(c.g);
      bytes.push(c.b);
    }
    bytes
  }

  /// The fixed two-entry black/white palette.
  pub fn mono() -> Self {
    Self {
      colors: vec![Color::black(), Color::white()],
    }
  }

  /// The 216-entry web-safe cube: six levels per channel, R-major.
  pub fn web() -> Self {
    let mut colors = Vec::with_capacity(216);
    for r in 0..6u16 {
      for g in 0..6u16 {
        for b in 0..6u16 {
          colors.push(Color::from_rgb((r * 51) as u8, (g * 51) as u8, (b * 51) as u8));
        }
      }
    }
    Self { colors }
  }

  /// Number of entries.
  pub fn len(&self) -> usize {
    self.colors.len()
  }

  /// Whether the palette has no entries.
  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  /// The entry at `index`, if present.
  pub fn get(&self, index: usize) -> Option<Color> {
    self.colors.get(index).copied()
  }

  /// All entries in order.
  pub fn colors(&self) -> &[Color] {
    &self.colors
  }

  /// Orders the entries by ascending Rec.601 luminance.
  pub fn sort_by_luminance(&mut self) {
    self.colors.sort_by(|a, b| a.luminance().total_cmp(&b.luminance()));
  }
}
