//! Sample - Acquisition 输出
//!
//! 单个采集时刻的凝视数据记录。

use serde::{Deserialize, Serialize};

/// Per-eye measurements
///
/// Every field is `None` when the tracker reported the value as invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    /// Normalized gaze x on the display area (0.0 - 1.0)
    pub gaze_x: Option<f32>,

    /// Normalized gaze y on the display area (0.0 - 1.0)
    pub gaze_y: Option<f32>,

    /// Pupil diameter (mm)
    pub pupil_mm: Option<f32>,

    /// Gaze point in the device coordinate system (mm)
    pub gaze_point_3d: Option<[f32; 3]>,

    /// Eye origin in the device coordinate system (mm)
    pub origin_3d: Option<[f32; 3]>,
}

impl EyeSample {
    /// Eye with only a normalized gaze point
    pub fn with_gaze(x: f32, y: f32) -> Self {
        Self {
            gaze_x: Some(x),
            gaze_y: Some(y),
            ..Self::default()
        }
    }

    /// Normalized gaze point, present only if both coordinates are
    pub fn gaze_point(&self) -> Option<(f32, f32)> {
        self.gaze_x.zip(self.gaze_y)
    }
}

/// Gaze sample
///
/// Immutable once created; shared read-only between sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix epoch (ms), derived from the system clock
    pub epoch_timestamp_ms: i64,

    /// Device clock (µs, monotonic)
    pub device_timestamp_us: i64,

    /// System clock (µs, monotonic)
    pub system_timestamp_us: i64,

    /// Midpoint in screen pixels
    pub mid_x_px: Option<i32>,
    pub mid_y_px: Option<i32>,

    /// Midpoint, normalized
    pub mid_x: Option<f32>,
    pub mid_y: Option<f32>,

    pub left: EyeSample,
    pub right: EyeSample,
}

impl Sample {
    /// Sample with timestamps only, every optional field absent
    pub fn new(epoch_timestamp_ms: i64, device_timestamp_us: i64, system_timestamp_us: i64) -> Self {
        Self {
            epoch_timestamp_ms,
            device_timestamp_us,
            system_timestamp_us,
            mid_x_px: None,
            mid_y_px: None,
            mid_x: None,
            mid_y: None,
            left: EyeSample::default(),
            right: EyeSample::default(),
        }
    }

    /// Set the derived midpoint
    pub fn with_midpoint(mut self, normalized: Option<(f32, f32)>, pixel: Option<(i32, i32)>) -> Self {
        self.mid_x = normalized.map(|(x, _)| x);
        self.mid_y = normalized.map(|(_, y)| y);
        self.mid_x_px = pixel.map(|(x, _)| x);
        self.mid_y_px = pixel.map(|(_, y)| y);
        self
    }

    /// Set both eyes
    pub fn with_eyes(mut self, left: EyeSample, right: EyeSample) -> Self {
        self.left = left;
        self.right = right;
        self
    }

    /// Midpoint pixel, present only if both coordinates are
    pub fn midpoint_px(&self) -> Option<(i32, i32)> {
        self.mid_x_px.zip(self.mid_y_px)
    }
}
