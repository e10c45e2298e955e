pub mod bridge;
pub mod color;
pub mod to_lab;

pub use self::color::Color;
