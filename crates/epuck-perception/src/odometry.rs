//! Dead-reckoning odometry integrator.
//!
//! Advances a [`Pose`] by one wheel-velocity sample held for `elapsed`:
//!
//! ```text
//! linear = elapsed × (left + right) / 2 × calibration
//! dθ     = elapsed × (right − left) / (2 × robot_radius × calibration)
//! x'     = x + linear × cos(θ + heading_offset)
//! y'     = y + linear × sin(θ + heading_offset)
//! θ'     = normalize(θ + dθ)
//! ```
//!
//! First-order integration only: the heading used for the projection is the
//! one at the start of the interval.  Callers keep intervals short (a few
//! hundred milliseconds at most) by resampling through the motor serializer.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use epuck_perception::odometry::{integrate, OdometryParams};
//! use epuck_types::{Pose, WheelVelocity};
//!
//! let params = OdometryParams::default();
//! let pose = integrate(
//!     Pose::origin(),
//!     WheelVelocity::straight(200.0),
//!     Duration::from_millis(1000),
//!     &params,
//! );
//! assert!((pose.x - 200.0).abs() < 1e-9);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use epuck_types::{Pose, WheelVelocity};

pub use epuck_types::{normalize_angle, shortest_rotation};

/// Kinematic constants of the differential drive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryParams {
    /// Converts wheel rate units into millimetres per second.
    pub calibration: f64,
    /// Half the distance between the wheels (millimetres).
    pub robot_radius: f64,
    /// Fixed angle between the heading and the direction of travel.
    pub heading_offset: f64,
}

impl Default for OdometryParams {
    fn default() -> Self {
        Self {
            calibration: 1.0,
            robot_radius: 27.0,
            heading_offset: 0.0,
        }
    }
}

impl OdometryParams {
    /// Forward speed (mm/s) produced by `velocity`.
    pub fn linear_rate(&self, velocity: WheelVelocity) -> f64 {
        (velocity.left + velocity.right) / 2.0 * self.calibration
    }

    /// Turn rate (rad/s, counter-clockwise positive) produced by `velocity`.
    pub fn angular_rate(&self, velocity: WheelVelocity) -> f64 {
        (velocity.right - velocity.left) / (2.0 * self.robot_radius * self.calibration)
    }
}

/// Integrate `pose` over `elapsed` at constant `velocity`.
///
/// A zero `elapsed` returns `pose` unchanged.
pub fn integrate(
    pose: Pose,
    velocity: WheelVelocity,
    elapsed: Duration,
    params: &OdometryParams,
) -> Pose {
    if elapsed.is_zero() {
        return pose;
    }
    let dt = elapsed.as_secs_f64();

    let linear = dt * params.linear_rate(velocity);
    let d_theta = dt * params.angular_rate(velocity);
    let travel = pose.theta + params.heading_offset;

    Pose::new(
        pose.x + linear * travel.cos(),
        pose.y + linear * travel.sin(),
        pose.theta + d_theta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    fn fixture() -> OdometryParams {
        OdometryParams {
            calibration: 1.0,
            robot_radius: 27.0,
            heading_offset: 0.0,
        }
    }

    #[test]
    fn straight_line_fixture_matches_closed_form() {
        let pose = integrate(
            Pose::origin(),
            WheelVelocity::new(200.0, 200.0),
            Duration::from_millis(1000),
            &fixture(),
        );
        assert!((pose.x - 200.0).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
        assert!(pose.theta.abs() < 1e-12);
    }

    #[test]
    fn zero_elapsed_is_noop() {
        let start = Pose::new(10.0, -4.0, 1.0);
        let pose = integrate(start, WheelVelocity::new(-50.0, 300.0), Duration::ZERO, &fixture());
        assert_eq!(pose, start);
    }

    #[test]
    fn spin_only_changes_heading() {
        // dθ = 0.5 × (100 − (−100)) / (2 × 27) = 100 / 54
        let pose = integrate(
            Pose::origin(),
            WheelVelocity::spin(100.0),
            Duration::from_millis(500),
            &fixture(),
        );
        assert!(pose.x.abs() < 1e-12);
        assert!(pose.y.abs() < 1e-12);
        assert!((pose.theta - 100.0 / 54.0).abs() < 1e-12);
    }

    #[test]
    fn heading_projects_displacement() {
        let start = Pose::new(5.0, 5.0, FRAC_PI_2);
        let pose = integrate(start, WheelVelocity::straight(100.0), Duration::from_secs(2), &fixture());
        assert!((pose.x - 5.0).abs() < 1e-9);
        assert!((pose.y - 205.0).abs() < 1e-9);
    }

    #[test]
    fn heading_offset_rotates_travel_direction() {
        let params = OdometryParams {
            heading_offset: FRAC_PI_2,
            ..fixture()
        };
        let pose = integrate(Pose::origin(), WheelVelocity::straight(100.0), Duration::from_secs(1), &params);
        assert!(pose.x.abs() < 1e-9);
        assert!((pose.y - 100.0).abs() < 1e-9);
        // The offset affects the projection, not the stored heading.
        assert!(pose.theta.abs() < 1e-12);
    }

    #[test]
    fn calibration_scales_linear_and_divides_angular() {
        let params = OdometryParams {
            calibration: 2.0,
            ..fixture()
        };
        let v = WheelVelocity::new(100.0, 200.0);
        assert!((params.linear_rate(v) - 300.0).abs() < 1e-12);
        assert!((params.angular_rate(v) - 100.0 / 108.0).abs() < 1e-12);
    }

    #[test]
    fn concatenated_intervals_compose_for_straight_motion() {
        let v = WheelVelocity::straight(150.0);
        let start = Pose::new(3.0, 4.0, 0.3);
        let whole = integrate(start, v, Duration::from_millis(900), &fixture());
        let split = integrate(
            integrate(start, v, Duration::from_millis(400), &fixture()),
            v,
            Duration::from_millis(500),
            &fixture(),
        );
        assert!((whole.x - split.x).abs() < 1e-9);
        assert!((whole.y - split.y).abs() < 1e-9);
        assert!((whole.theta - split.theta).abs() < 1e-12);
    }

    #[test]
    fn concatenated_intervals_compose_for_spin() {
        let v = WheelVelocity::spin(80.0);
        let whole = integrate(Pose::origin(), v, Duration::from_millis(3000), &fixture());
        let mut split = Pose::origin();
        for _ in 0..3 {
            split = integrate(split, v, Duration::from_millis(1000), &fixture());
        }
        assert!((whole.theta - split.theta).abs() < 1e-9);
    }

    #[test]
    fn theta_wraps_after_full_turns() {
        // Spin long enough for several full turns in the negative direction.
        let pose = integrate(
            Pose::new(0.0, 0.0, PI),
            WheelVelocity::spin(-200.0),
            Duration::from_secs(20),
            &fixture(),
        );
        assert!((0.0..TAU).contains(&pose.theta));
    }
}
