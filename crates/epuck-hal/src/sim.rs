//! In-process simulated e-puck for tests and headless runs.
//!
//! [`SimWorld`] holds the ground truth: a rectangular arena with circular
//! objects and the true pose of the robot.  The drivers share the world and
//! advance the true pose with the same kinematics the odometry uses, timed on
//! the tokio clock so paused-time tests stay deterministic.
//!
//! # Example
//!
//! ```rust
//! use epuck_hal::actuator::WheelActuator;
//! use epuck_hal::sim::{ArenaConfig, SimWheels, SimWorld};
//! use epuck_types::WheelVelocity;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let world = SimWorld::new(ArenaConfig::default(), Default::default(), Default::default());
//! let mut wheels = SimWheels::new(world.clone());
//! wheels.set_wheel_velocity(WheelVelocity::straight(100.0)).unwrap();
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use epuck_perception::odometry::{OdometryParams, integrate};
use epuck_perception::sensor::SensorGeometry;
use epuck_types::{ExplorerError, Melody, Point, Pose, WheelVelocity};

use crate::actuator::WheelActuator;
use crate::alert::AlertPlayer;
use crate::camera::{Camera, CameraFrame};
use crate::proximity::{PROXIMITY_SENSORS, ProximitySensor};
use crate::range::RangeSensor;
use crate::registry::{FRONT_CAMERA_ID, FRONT_RANGE_ID, PROXIMITY_ID, SPEAKER_ID, WHEELS_ID};

/// Raw value the time-of-flight sensor reports when nothing is in reach.
pub const OUT_OF_RANGE: f64 = 8190.0;

/// Frames are bright when an object is closer than this (millimetres).
const CAMERA_REACH: f64 = 200.0;

/// Infrared sensors see nothing farther than this (millimetres).
pub const IR_REACH: f64 = 150.0;
/// Delta gained per millimetre of approach.
const IR_GAIN: f64 = 20.0;
/// Distance from the centre to the infrared sensors.
const IR_RIM: f64 = 35.0;
/// Sensor bearings from the heading, counter-clockwise positive.
const IR_BEARINGS_DEG: [f64; PROXIMITY_SENSORS] = [-17.5, -45.0, -90.0, -150.0, 150.0, 90.0, 45.0, 17.5];

/// A round object standing in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimObject {
    pub center: Point,
    pub radius: f64,
}

/// Ground truth of a simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Arena size along its own x axis (millimetres).
    pub width: f64,
    /// Arena size along its own y axis (millimetres).
    pub height: f64,
    /// Constant error added to every raw range reading.
    pub range_bias: f64,
    /// True starting pose, in arena coordinates.
    pub start: Pose,
    pub objects: Vec<SimObject>,
}

impl Default for ArenaConfig {
    /// A 600 × 400 arena with two objects; the robot starts facing the west
    /// wall 66 mm away, ready for sensor calibration.
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 400.0,
            range_bias: 6.0,
            start: Pose::new(101.0, 170.0, std::f64::consts::PI),
            objects: vec![
                SimObject {
                    center: Point::new(420.0, 280.0),
                    radius: 20.0,
                },
                SimObject {
                    center: Point::new(180.0, 90.0),
                    radius: 20.0,
                },
            ],
        }
    }
}

struct SimState {
    arena: ArenaConfig,
    odometry: OdometryParams,
    sensor: SensorGeometry,
    pose: Pose,
    velocity: WheelVelocity,
    since: Instant,
    melodies: Vec<Melody>,
    captures: usize,
}

impl SimState {
    fn advance(&mut self) {
        let now = Instant::now();
        self.pose = integrate(self.pose, self.velocity, now - self.since, &self.odometry);
        self.since = now;
    }

    /// True distance from the sensor face to the first surface ahead, and
    /// whether that surface is an object.
    fn front_hit(&self) -> (f64, bool) {
        self.cast(self.sensor.mount_angle, self.sensor.offset)
    }

    /// First surface along the ray leaving the body `rim` mm from the centre
    /// at `bearing` from the heading.
    fn cast(&self, bearing: f64, rim: f64) -> (f64, bool) {
        let angle = self.pose.theta + bearing;
        let (dx, dy) = (angle.cos(), angle.sin());
        let origin = Point::new(self.pose.x + rim * dx, self.pose.y + rim * dy);

        let wall = box_exit(origin, dx, dy, self.arena.width, self.arena.height);
        let object = self
            .arena
            .objects
            .iter()
            .filter_map(|o| circle_hit(origin, dx, dy, o))
            .fold(f64::INFINITY, f64::min);

        if object < wall { (object, true) } else { (wall, false) }
    }
}

fn box_exit(from: Point, dx: f64, dy: f64, w: f64, h: f64) -> f64 {
    let mut t = f64::INFINITY;
    if dx > 1e-12 {
        t = t.min((w - from.x) / dx);
    } else if dx < -1e-12 {
        t = t.min(-from.x / dx);
    }
    if dy > 1e-12 {
        t = t.min((h - from.y) / dy);
    } else if dy < -1e-12 {
        t = t.min(-from.y / dy);
    }
    t.max(0.0)
}

fn circle_hit(from: Point, dx: f64, dy: f64, object: &SimObject) -> Option<f64> {
    let (fx, fy) = (from.x - object.center.x, from.y - object.center.y);
    let b = fx * dx + fy * dy;
    let c = fx * fx + fy * fy - object.radius * object.radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    (t >= 0.0).then_some(t)
}

/// Shared simulated world.
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<SimState>>,
}

impl SimWorld {
    pub fn new(arena: ArenaConfig, odometry: OdometryParams, sensor: SensorGeometry) -> Self {
        let pose = arena.start;
        Self {
            state: Arc::new(Mutex::new(SimState {
                arena,
                odometry,
                sensor,
                pose,
                velocity: WheelVelocity::STOP,
                since: Instant::now(),
                melodies: Vec::new(),
                captures: 0,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, ExplorerError> {
        self.state.lock().map_err(|e| ExplorerError::HardwareFault {
            component: "sim".to_string(),
            details: e.to_string(),
        })
    }

    /// Current true pose in arena coordinates.
    pub fn true_pose(&self) -> Result<Pose, ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        Ok(s.pose)
    }

    /// Move the robot by hand, as an operator would.
    pub fn place(&self, pose: Pose) -> Result<(), ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        s.pose = pose;
        Ok(())
    }

    pub fn velocity(&self) -> Result<WheelVelocity, ExplorerError> {
        Ok(self.lock()?.velocity)
    }

    pub fn melodies(&self) -> Result<Vec<Melody>, ExplorerError> {
        Ok(self.lock()?.melodies.clone())
    }

    pub fn captures(&self) -> Result<usize, ExplorerError> {
        Ok(self.lock()?.captures)
    }

    fn command(&self, velocity: WheelVelocity) -> Result<(), ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        s.velocity = velocity;
        trace!(left = velocity.left, right = velocity.right, "sim wheels");
        Ok(())
    }

    fn read_range(&self) -> Result<f64, ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        let (distance, _) = s.front_hit();
        let raw = distance + s.arena.range_bias;
        Ok(if raw > s.sensor.max_range { OUT_OF_RANGE } else { raw })
    }

    fn read_deltas(&self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        Ok(IR_BEARINGS_DEG.map(|deg| {
            let (distance, _) = s.cast(deg.to_radians(), IR_RIM);
            IR_GAIN * (IR_REACH - distance).max(0.0)
        }))
    }

    fn capture(&self) -> Result<CameraFrame, ExplorerError> {
        let mut s = self.lock()?;
        s.advance();
        s.captures += 1;
        let (distance, object) = s.front_hit();
        let level = if object && distance < CAMERA_REACH { 200 } else { 40 };
        Ok(CameraFrame {
            width: 8,
            height: 8,
            data: vec![level; 64],
        })
    }

    fn play(&self, melody: Melody) -> Result<(), ExplorerError> {
        self.lock()?.melodies.push(melody);
        debug!(?melody, "sim speaker");
        Ok(())
    }
}

pub struct SimWheels {
    world: SimWorld,
    velocity: WheelVelocity,
}

impl SimWheels {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            velocity: WheelVelocity::STOP,
        }
    }
}

impl WheelActuator for SimWheels {
    fn id(&self) -> &str {
        WHEELS_ID
    }

    fn set_wheel_velocity(&mut self, velocity: WheelVelocity) -> Result<(), ExplorerError> {
        self.world.command(velocity)?;
        self.velocity = velocity;
        Ok(())
    }

    fn velocity(&self) -> WheelVelocity {
        self.velocity
    }
}

pub struct SimRangeSensor {
    world: SimWorld,
}

impl SimRangeSensor {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl RangeSensor for SimRangeSensor {
    fn id(&self) -> &str {
        FRONT_RANGE_ID
    }

    fn read_range(&mut self) -> Result<f64, ExplorerError> {
        self.world.read_range()
    }
}

/// Deltas fall linearly with the distance from the rim and vanish past
/// [`IR_REACH`].
pub struct SimProximity {
    world: SimWorld,
}

impl SimProximity {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl ProximitySensor for SimProximity {
    fn id(&self) -> &str {
        PROXIMITY_ID
    }

    fn read_deltas(&mut self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError> {
        self.world.read_deltas()
    }
}

/// Returns an 8 × 8 frame, bright when an object is close in front.
pub struct SimCamera {
    world: SimWorld,
}

impl SimCamera {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        FRONT_CAMERA_ID
    }

    fn capture(&mut self) -> Result<CameraFrame, ExplorerError> {
        self.world.capture()
    }
}

/// Records every melody; playback ends immediately.
pub struct SimAlertPlayer {
    world: SimWorld,
}

impl SimAlertPlayer {
    pub fn new(world: SimWorld) -> Self {
        Self { world }
    }
}

impl AlertPlayer for SimAlertPlayer {
    fn id(&self) -> &str {
        SPEAKER_ID
    }

    fn play_melody(&mut self, melody: Melody) -> Result<(), ExplorerError> {
        self.world.play(melody)
    }

    fn wait_for_melody_end(&mut self) -> Result<(), ExplorerError> {
        Ok(())
    }
}
