//! Indexed-color conversion engine.
//!
//! Reduces continuous-tone layers to a palette of at most 256 colors plus a
//! per-pixel index image: a perceptually-weighted median cut over a dense
//! L*a*b* histogram builds the palette, the histogram memory is then reused
//! as an inverse-colormap cache, and one of several mapping passes (plain
//! nearest, ordered dither, linear-light Floyd-Steinberg, exact lookup)
//! produces the output.

mod builder;
mod colormap;
mod cut;
mod histogram;
mod inverse;
mod pass2;
mod remap;
mod tables;

pub mod convert;
pub mod dither;
pub mod error;
pub mod options;

pub use self::convert::{convert_indexed, convert_indexed_with_bridge};
pub use self::dither::{DM_HEIGHT, DM_WIDTH, set_dither_matrix};
pub use self::error::ConvertError;
pub use self::options::{ConvertOptions, DitherMode, PaletteMode};
