//! Heading arithmetic shared by calibration and path execution.
//!
//! Headings are degrees measured counter-clockwise from the +x axis of the
//! track frame, where +y points *down*. A displacement `(dx, dy)` therefore
//! has heading `atan2(-dy, dx)`.

/// Normalize heading to [0, 360).
///
/// Non-finite input maps to 0.
#[inline]
pub fn normalize_heading(deg: f32) -> f32 {
    if !deg.is_finite() {
        return 0.0;
    }
    let h = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if h >= 360.0 { 0.0 } else { h }
}

/// Smallest signed difference for a heading change, in [-180, 180].
#[inline]
pub fn signed_heading_delta(delta: f32) -> f32 {
    if !delta.is_finite() {
        return 0.0;
    }
    (delta + 540.0).rem_euclid(360.0) - 180.0
}

/// Heading of a displacement in the track frame (+y down).
#[inline]
pub fn displacement_heading(dx: f32, dy: f32) -> f32 {
    normalize_heading((-dy).atan2(dx).to_degrees())
}

/// Integer heading as sent to the device.
///
/// Truncates toward zero after normalisation, so the result is always 0..=359.
#[inline]
pub fn command_heading(deg: f32) -> u16 {
    (normalize_heading(deg) as u16).min(359)
}
