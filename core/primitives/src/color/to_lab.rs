fn srgb_to_linear(c: f32) -> f32 {
  if c <= 0.04045 {
    c / 12.92
  } else {
    ((c + 0.055) / 1.055).powf(2.4)
  }
}
fn linear_to_srgb(c: f32) -> f32 {
  if c <= 0.003_130_8 {
    c * 12.92
  } else {
    1.055 * c.powf(1.0 / 2.4) - 0.055
  }
}
fn linear_rgb_to_xyz(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
  let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
  let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
  let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;
  (x, y, z)
}
fn xyz_to_linear_rgb(x: f32, y: f32, z: f32) -> (f32, f32, f32) {
  let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
  let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
  let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;
  (r, g, b)
}

const EPS: f32 = 216.0 / 24389.0; // (6/29)^3
const K: f32 = 24389.0 / 27.0; // (29/6)^3

fn f_xyz(t: f32) -> f32 {
  if t > EPS {
    t.powf(1.0 / 3.0)
  } else {
    (K * t + 16.0) / 116.0
  }
}
fn f_xyz_inv(f: f32) -> f32 {
  let t = f * f * f;
  if t > EPS { t } else { (116.0 * f - 16.0) / K }
}

// XYZ <-> Lab helpers (D65 white point)
const XN: f32 = 0.95047;
const YN: f32 = 1.00000;
const ZN: f32 = 1.08883;

fn linear_rgb_to_lab(r_lin: f32, g_lin: f32, b_lin: f32) -> (f32, f32, f32) {
  let (x, y, z) = linear_rgb_to_xyz(r_lin, g_lin, b_lin);
  let fx = f_xyz(x / XN);
  let fy = f_xyz(y / YN);
  let fz = f_xyz(z / ZN);
  let l = 116.0 * fy - 16.0;
  let a = 500.0 * (fx - fy);
  let b = 200.0 * (fy - fz);
  (l, a, b)
}
fn lab_to_linear_rgb(l: f32, a: f32, b: f32) -> (f32, f32, f32) {
  let fy = (l + 16.0) / 116.0;
  let fx = fy + a / 500.0;
  let fz = fy - b / 200.0;
  let x = XN * f_xyz_inv(fx);
  let y = YN * f_xyz_inv(fy);
  let z = ZN * f_xyz_inv(fz);
  xyz_to_linear_rgb(x, y, z)
}

/// Converts sRGB color to Lab color space.
/// - `r`: The red channel (0-255).
/// - `g`: The green channel (0-255).
/// - `b`: The blue channel (0-255).
/// Returns a tuple `(L, a, b)` representing the Lab color.
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
  let r_lin = srgb_to_linear(r as f32 / 255.0);
  let g_lin = srgb_to_linear(g as f32 / 255.0);
  let b_lin = srgb_to_linear(b as f32 / 255.0);

  linear_rgb_to_lab(r_lin, g_lin, b_lin)
}
/// Converts a Lab color back to sRGB, clamping out-of-gamut values.
/// - `l`: The lightness component.
/// - `a`: The green-red component.
/// - `b`: The blue-yellow component.
/// Returns the `(r, g, b)` triple.
pub fn lab_to_rgb(l: f32, a: f32, b: f32) -> (u8, u8, u8) {
  let (r_lin, g_lin, b_lin) = lab_to_linear_rgb(l, a, b);
  let r = (linear_to_srgb(r_lin) * 255.0).round().clamp(0.0, 255.0);
  let g = (linear_to_srgb(g_lin) * 255.0).round().clamp(0.0, 255.0);
  let bb = (linear_to_srgb(b_lin) * 255.0).round().clamp(0.0, 255.0);
  (r as u8, g as u8, bb as u8)
}
/// Converts an sRGB channel represented as u8 (0-255) to linear u16 (0-65535).
/// - `v`: The sRGB channel value (0-255).
/// Returns the linear channel value.
pub fn srgb_u8_to_linear_u16(v: u8) -> u16 {
  (srgb_to_linear(v as f32 / 255.0) * 65535.0).round() as u16
}
/// Converts a linear u16 channel (0-65535) back to an sRGB float (0-1).
/// - `v`: The linear channel value.
/// Returns the sRGB channel value.
pub fn linear_u16_to_srgb_f32(v: u16) -> f32 {
  linear_to_srgb(v as f32 / 65535.0)
}
