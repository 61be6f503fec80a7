//! Source-unit to pixel conversions.
//!
//! Document lengths arrive in the units the source format uses (twips for
//! page geometry and indents, EMU for drawings, half-points for font sizes).
//! Layout works in CSS pixels at 96 DPI.

/// Pixels per inch used by layout.
pub const PX_PER_INCH: f32 = 96.0;
/// Twips per inch (1 twip = 1/20 pt).
pub const TWIPS_PER_INCH: f32 = 1440.0;
/// English Metric Units per inch.
pub const EMU_PER_INCH: f32 = 914_400.0;
/// Points per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Convert twips to pixels.
pub fn twips_to_px(twips: i32) -> f32 {
    twips as f32 * PX_PER_INCH / TWIPS_PER_INCH
}

/// Convert EMU to pixels.
pub fn emu_to_px(emu: i64) -> f32 {
    (emu as f64 * f64::from(PX_PER_INCH) / f64::from(EMU_PER_INCH)) as f32
}

/// Convert half-points (font sizes) to pixels.
pub fn half_points_to_px(half_points: u32) -> f32 {
    points_to_px(half_points as f32 / 2.0)
}

/// Convert points to pixels.
pub fn points_to_px(points: f32) -> f32 {
    points * PX_PER_INCH / POINTS_PER_INCH
}

/// Convert pixels back to twips, rounding to the nearest twip.
pub fn px_to_twips(px: f32) -> i32 {
    (px * TWIPS_PER_INCH / PX_PER_INCH).round() as i32
}
