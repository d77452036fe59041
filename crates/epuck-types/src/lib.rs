use std::f64::consts::{PI, TAU};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Angles
// ────────────────────────────────────────────────────────────────────────────

/// Wrap `theta` into `[0, 2π)`.
///
/// Works for any finite input, including large multiples of 2π and negative
/// angles.
pub fn normalize_angle(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Map `angle` onto the equivalent rotation in `(-π, π]`.
pub fn shortest_rotation(angle: f64) -> f64 {
    let a = normalize_angle(angle);
    if a > PI { a - TAU } else { a }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A point in the 2-D world frame (millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Robot position and heading in the 2-D world frame.
///
/// `theta` is always kept in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    /// Create a pose, normalising `theta`.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    /// The pose every discovery cycle starts from.
    pub fn origin() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Left/right wheel rate command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelVelocity {
    pub left: f64,
    pub right: f64,
}

impl WheelVelocity {
    /// The stop vector.
    pub const STOP: WheelVelocity = WheelVelocity {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Both wheels at `speed`.
    pub fn straight(speed: f64) -> Self {
        Self::new(speed, speed)
    }

    /// Turn on the spot; positive `speed` turns counter-clockwise.
    pub fn spin(speed: f64) -> Self {
        Self::new(-speed, speed)
    }

    pub fn is_stop(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// One range reading together with the pose it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub pose: Pose,
    /// Calibrated range reading (millimetres).
    pub range: f64,
}

/// Axis-aligned arena rectangle in the calibrated frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallBoundary {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl WallBoundary {
    /// Distance from `p` to the nearest of the four boundary lines.
    pub fn distance_to_nearest_wall(&self, p: &Point) -> f64 {
        [
            (p.x - self.x_min).abs(),
            (self.x_max - p.x).abs(),
            (p.y - self.y_min).abs(),
            (self.y_max - p.y).abs(),
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
    }

    /// `true` when `p` lies strictly inside the rectangle shrunk by `margin`.
    pub fn contains_with_margin(&self, p: &Point, margin: f64) -> bool {
        p.x > self.x_min + margin
            && p.x < self.x_max - margin
            && p.y > self.y_min + margin
            && p.y < self.y_max - margin
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// Three-segment motion plan: turn, drive, turn.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotDistance {
    /// First rotation (radians, counter-clockwise positive).
    pub rotate1: f64,
    /// Straight translation (millimetres).
    pub translate: f64,
    /// Final rotation (radians, counter-clockwise positive).
    pub rotate2: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Alerts & telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Melodies the alert subsystem knows how to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Melody {
    Startup,
    WorkDone,
    IllegalAction,
    Fault,
}

/// Importance of a telemetry message. Ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verbosity {
    Debug,
    Info,
    Important,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "epuck-runtime::explorer"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Free-form operator message.
    Message { text: String, verbosity: Verbosity },
    PoseUpdate(Pose),
    CalibrationCompleted {
        success: bool,
        boundary: Option<WallBoundary>,
    },
    /// A new object was added to the object list and needs a photograph.
    ObjectDiscovered(Point),
    PhotoCaptured {
        target: Point,
        width: u32,
        height: u32,
        looks_like_object: bool,
    },
    MapReport {
        boundary: Option<WallBoundary>,
        objects: Vec<Point>,
    },
    Alert(Melody),
    HardwareFault {
        component: String,
        message: String,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning hardware failures, stalled waits, and rejected
/// requests.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorerError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Timed out after {after_ms} ms waiting for {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Motor command serializer is no longer running")]
    SerializerStopped,

    #[error("Illegal action: cannot start {requested} while {state}")]
    IllegalAction { state: String, requested: String },

    #[error("Arena frame is not calibrated")]
    NotCalibrated,

    #[error("Capacity exceeded for {what} (limit {limit})")]
    CapacityExceeded { what: String, limit: usize },

    #[error("Unsafe command rejected by {rule}: {details}")]
    UnsafeCommand { rule: String, details: String },

    #[error("Activity {activity} ended abnormally: {details}")]
    ActivityAborted { activity: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_angle_stays_in_range() {
        for theta in [
            0.0,
            TAU,
            -TAU,
            1000.0 * TAU + 0.5,
            -1000.0 * TAU - 0.5,
            -1e-18,
            3.0 * PI,
            -PI / 2.0,
            1e9,
            -1e9,
        ] {
            let n = normalize_angle(theta);
            assert!((0.0..TAU).contains(&n), "{theta} -> {n}");
        }
    }

    #[test]
    fn normalize_angle_wraps_negative_quarter_turn() {
        assert!((normalize_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((normalize_angle(5.0 * TAU + 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn shortest_rotation_prefers_small_turns() {
        assert!((shortest_rotation(1.5 * PI) + PI / 2.0).abs() < 1e-12);
        assert!((shortest_rotation(-1.5 * PI) - PI / 2.0).abs() < 1e-12);
        assert!((shortest_rotation(PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn pose_new_normalizes_theta() {
        let pose = Pose::new(1.0, 2.0, -PI);
        assert!((pose.theta - PI).abs() < 1e-12);
    }

    #[test]
    fn wheel_velocity_stop_detection() {
        assert!(WheelVelocity::STOP.is_stop());
        assert!(!WheelVelocity::straight(200.0).is_stop());
        assert_eq!(WheelVelocity::spin(100.0), WheelVelocity::new(-100.0, 100.0));
    }

    #[test]
    fn boundary_margin_and_wall_distance() {
        let b = WallBoundary {
            x_min: 0.0,
            x_max: 500.0,
            y_min: 0.0,
            y_max: 300.0,
        };
        assert!(b.contains_with_margin(&Point::new(250.0, 150.0), 20.0));
        assert!(!b.contains_with_margin(&Point::new(10.0, 150.0), 20.0));
        assert!((b.distance_to_nearest_wall(&Point::new(490.0, 150.0)) - 10.0).abs() < 1e-12);
        assert_eq!(b.center(), Point::new(250.0, 150.0));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "epuck-runtime::explorer",
            EventPayload::MapReport {
                boundary: None,
                objects: vec![Point::new(1.0, 2.0)],
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn explorer_error_display() {
        let err = ExplorerError::Timeout {
            operation: "movement end".to_string(),
            after_ms: 250,
        };
        assert!(err.to_string().contains("250 ms"));

        let err2 = ExplorerError::HardwareFault {
            component: "left_wheel".to_string(),
            details: "stalled".to_string(),
        };
        assert!(err2.to_string().contains("left_wheel"));
    }
}
