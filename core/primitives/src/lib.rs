//! Minimal primitives crate containing the color value types shared by the
//! indexed-conversion engine and its collaborators.
//! This crate is intended to be light-weight and free of heavy dependencies such as IO and transforms.

pub mod color;
pub mod format;
pub mod palette;

pub use self::color::Color;
pub use self::color::bridge::{ColorBridge, SrgbBridge};
pub use self::format::{BaseType, PixelFormat};
pub use self::palette::{MAX_PALETTE_SIZE, Palette};
