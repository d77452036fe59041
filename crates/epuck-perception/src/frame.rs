//! 2-D rigid frame transforms.
//!
//! A [`FrameTransform`] re-expresses points and poses from the dead-reckoned
//! frame in a new reference frame: `p' = R(rotation) · p + translation`.
//! Frame calibration builds one from a detected arena corner and applies it
//! once to the robot pose.
//!
//! # Example
//!
//! ```rust
//! use std::f64::consts::FRAC_PI_2;
//! use epuck_perception::frame::FrameTransform;
//! use epuck_types::Point;
//!
//! // New frame: origin at (100, 0), x axis pointing along old +y.
//! let tf = FrameTransform::from_origin_and_axis(Point::new(100.0, 0.0), FRAC_PI_2);
//! let p = tf.apply_point(Point::new(100.0, 50.0));
//! assert!((p.x - 50.0).abs() < 1e-9);
//! assert!(p.y.abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use epuck_types::{Point, Pose};

/// Rotation followed by translation in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    /// Counter-clockwise rotation (radians).
    pub rotation: f64,
    /// Translation applied after the rotation.
    pub translation: Point,
}

impl FrameTransform {
    pub fn new(rotation: f64, translation: Point) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, Point::default())
    }

    /// The transform into a frame whose origin sits at `origin` and whose
    /// x axis points along `axis_heading`, both expressed in the current frame.
    pub fn from_origin_and_axis(origin: Point, axis_heading: f64) -> Self {
        let rotation = -axis_heading;
        let rotated = rotate(origin, rotation);
        Self::new(rotation, Point::new(-rotated.x, -rotated.y))
    }

    pub fn apply_point(&self, p: Point) -> Point {
        let r = rotate(p, self.rotation);
        Point::new(r.x + self.translation.x, r.y + self.translation.y)
    }

    pub fn apply_pose(&self, pose: Pose) -> Pose {
        let p = self.apply_point(pose.position());
        Pose::new(p.x, p.y, pose.theta + self.rotation)
    }

    /// `self` applied first, then `next`.
    pub fn compose(&self, next: &FrameTransform) -> FrameTransform {
        let t = rotate(self.translation, next.rotation);
        FrameTransform::new(
            self.rotation + next.rotation,
            Point::new(t.x + next.translation.x, t.y + next.translation.y),
        )
    }

    pub fn inverse(&self) -> FrameTransform {
        let t = rotate(self.translation, -self.rotation);
        FrameTransform::new(-self.rotation, Point::new(-t.x, -t.y))
    }
}

fn rotate(p: Point, angle: f64) -> Point {
    let (s, c) = angle.sin_cos();
    Point::new(c * p.x - s * p.y, s * p.x + c * p.y)
}
