//! Front range sensor geometry.
//!
//! Readings are distances from the sensor face.  The sensor sits
//! `offset` millimetres ahead of the wheel axis, turned `mount_angle`
//! radians from the robot heading, so a reading taken at `pose` lands at
//!
//! ```text
//! point = pose.position + (range + offset) · (cos, sin)(pose.theta + mount_angle)
//! ```

use serde::{Deserialize, Serialize};

use epuck_types::{Measurement, Point};

/// Mounting and validity limits of the range sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorGeometry {
    /// Distance from the robot centre to the sensor face (millimetres).
    pub offset: f64,
    /// Angle between the robot heading and the sensor axis (radians).
    pub mount_angle: f64,
    /// Shortest trustworthy reading (millimetres).
    pub min_range: f64,
    /// Longest trustworthy reading (millimetres).
    pub max_range: f64,
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            offset: 35.0,
            mount_angle: 0.0,
            min_range: 0.0,
            max_range: 2000.0,
        }
    }
}

impl SensorGeometry {
    pub fn in_range(&self, range: f64) -> bool {
        range.is_finite() && range >= self.min_range && range <= self.max_range
    }

    /// World point hit by `m`.
    pub fn to_world(&self, m: &Measurement) -> Point {
        let reach = m.range + self.offset;
        let angle = m.pose.theta + self.mount_angle;
        Point::new(
            m.pose.x + reach * angle.cos(),
            m.pose.y + reach * angle.sin(),
        )
    }
}
