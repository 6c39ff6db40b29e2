//! Midpoint derivation
//!
//! Combines both eyes into one gaze position, normalized and in pixels.

use contracts::EyeSample;

/// Display resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl ScreenSize {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }
}

/// Derived midpoint: normalized `(x, y)` and pixel `(x, y)`
pub type Midpoint = (Option<(f32, f32)>, Option<(i32, i32)>);

/// Average both valid eyes, or take the only valid one
///
/// The pixel form is present only when both normalized coordinates lie in
/// `[0, 1)`; pixels are truncated toward zero.
pub fn derive_midpoint(left: &EyeSample, right: &EyeSample, screen: ScreenSize) -> Midpoint {
    let normalized = match (left.gaze_point(), right.gaze_point()) {
        (Some((lx, ly)), Some((rx, ry))) => Some(((lx + rx) / 2.0, (ly + ry) / 2.0)),
        (Some(point), None) | (None, Some(point)) => Some(point),
        (None, None) => None,
    };

    let pixel = normalized.and_then(|(x, y)| {
        let on_screen = |v: f32| (0.0..1.0).contains(&v);
        (on_screen(x) && on_screen(y)).then(|| {
            (
                (x * screen.width_px as f32) as i32,
                (y * screen.height_px as f32) as i32,
            )
        })
    });

    (normalized, pixel)
}
