//! [`DisplacementPlanner`] – turn, drive, turn.
//!
//! Every displacement is decomposed into a [`RobotDistance`] by [`plan_to`]
//! and executed as three strictly sequential segments through the motor
//! serializer: set a velocity, hold it for the computed time, stop, and wait
//! for the movement-ended gate.  Translation segments race the obstacle gate
//! and end early when it rises.
//!
//! Segment times are whole milliseconds; the wheel rate is scaled down so
//! that rate × time covers the requested amount exactly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use epuck_hal::camera::{CameraFrame, SharedCamera};
use epuck_hal::registry::FRONT_CAMERA_ID;
use epuck_kernel::{MotorHandle, ObstacleGate};
use epuck_middleware::{EventBus, Topic};
use epuck_perception::odometry::{OdometryParams, shortest_rotation};
use epuck_types::{EventPayload, ExplorerError, Point, Pose, RobotDistance, WheelVelocity};

const SOURCE: &str = "epuck-runtime::planner";

/// Amounts below this (mm or rad) are not worth a segment.
const NEGLIGIBLE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Wheel rate for translations.
    pub cruise_speed: f64,
    /// Wheel rate for rotations on the spot.
    pub turn_speed: f64,
    /// Distance kept from an object when photographing it (millimetres).
    pub standoff: f64,
    /// Angle between the heading and the direction the robot drives in.
    pub heading_convention: f64,
    /// Bound on each wait for the movement-ended gate.
    pub settle_timeout_ms: u64,
    /// Mean frame brightness above which a photograph shows an object.
    pub object_brightness: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 400.0,
            turn_speed: 200.0,
            standoff: 80.0,
            heading_convention: 0.0,
            settle_timeout_ms: 2000,
            object_brightness: 120.0,
        }
    }
}

/// Decompose the way from `pose` to `target` into turn, drive, turn.
///
/// The drive stops `standoff` short of the target.  When the target position
/// coincides with the pose only the final turn remains.
pub fn plan_to(target: Pose, pose: Pose, standoff: f64, heading_convention: f64) -> RobotDistance {
    let (dx, dy) = (target.x - pose.x, target.y - pose.y);
    let distance = dx.hypot(dy);

    if distance < NEGLIGIBLE {
        return RobotDistance {
            rotate1: 0.0,
            translate: 0.0,
            rotate2: shortest_rotation(target.theta - pose.theta),
        };
    }

    let bearing = dy.atan2(dx);
    // Heading once the first turn is done.
    let facing = bearing - heading_convention;
    RobotDistance {
        rotate1: shortest_rotation(facing - pose.theta),
        translate: (distance - standoff).max(0.0),
        rotate2: shortest_rotation(target.theta - facing),
    }
}

/// How a displacement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Reached,
    /// The obstacle gate cut the translation short.
    Blocked,
}

/// A photograph taken at the end of a visit.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub target: Point,
    pub arrival: Arrival,
    pub width: u32,
    pub height: u32,
    pub brightness: f64,
    pub looks_like_object: bool,
}

#[derive(Clone)]
pub struct DisplacementPlanner {
    motors: MotorHandle,
    gate: ObstacleGate,
    camera: SharedCamera,
    bus: EventBus,
    odometry: OdometryParams,
    config: MotionConfig,
}

impl DisplacementPlanner {
    pub fn new(
        motors: MotorHandle,
        gate: ObstacleGate,
        camera: SharedCamera,
        bus: EventBus,
        odometry: OdometryParams,
        config: MotionConfig,
    ) -> Self {
        Self {
            motors,
            gate,
            camera,
            bus,
            odometry,
            config,
        }
    }

    pub fn motors(&self) -> &MotorHandle {
        &self.motors
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Plan from the current synced pose to `target`, without moving.  The
    /// drive stops at the photographing stand-off.
    pub async fn robot_displacement(&self, target: Pose) -> Result<RobotDistance, ExplorerError> {
        let pose = self.motors.actual_position().await?;
        Ok(plan_to(
            target,
            pose,
            self.config.standoff,
            self.config.heading_convention,
        ))
    }

    /// Drive to `point`, arriving with the heading of travel.
    pub async fn go_to(&self, point: Point) -> Result<Arrival, ExplorerError> {
        let pose = self.motors.actual_position().await?;
        let plan = plan_to(facing_from(pose, point), pose, 0.0, self.config.heading_convention);
        self.execute(plan).await
    }

    /// Run the three segments of `plan` in order.  A blocked translation
    /// skips the final turn.
    pub async fn execute(&self, plan: RobotDistance) -> Result<Arrival, ExplorerError> {
        debug!(rotate1 = plan.rotate1, translate = plan.translate, rotate2 = plan.rotate2, "executing plan");
        self.rotate_by(plan.rotate1).await?;
        if self.translate_by(plan.translate).await? == Arrival::Blocked {
            let pose = self.motors.last_pose();
            warn!(x = pose.x, y = pose.y, "translation stopped by obstacle");
            return Ok(Arrival::Blocked);
        }
        self.rotate_by(plan.rotate2).await?;
        Ok(Arrival::Reached)
    }

    /// Turn on the spot by `angle` radians (counter-clockwise positive).
    pub async fn rotate_by(&self, angle: f64) -> Result<Pose, ExplorerError> {
        if angle.abs() < NEGLIGIBLE {
            return Ok(self.motors.last_pose());
        }
        let unit_rate = self.odometry.angular_rate(WheelVelocity::spin(1.0));
        let hold = segment_time(angle.abs(), self.config.turn_speed * unit_rate);
        let speed = angle / (hold.as_secs_f64() * unit_rate);
        self.hold(WheelVelocity::spin(speed), hold, false).await?;
        self.motors.actual_position().await
    }

    /// Drive straight by `distance` mm, backwards when negative.  Only
    /// forward drives race the obstacle gate.
    pub async fn translate_by(&self, distance: f64) -> Result<Arrival, ExplorerError> {
        if distance.abs() < NEGLIGIBLE {
            return Ok(Arrival::Reached);
        }
        let unit_rate = self.odometry.linear_rate(WheelVelocity::straight(1.0));
        let hold = segment_time(distance.abs(), self.config.cruise_speed * unit_rate);
        let speed = distance / (hold.as_secs_f64() * unit_rate);
        self.hold(WheelVelocity::straight(speed), hold, distance > 0.0).await
    }

    /// Set `velocity`, keep it for `hold` (or until the obstacle gate rises
    /// when `guarded`), then stop and wait for the wheels to settle.
    async fn hold(&self, velocity: WheelVelocity, hold: Duration, guarded: bool) -> Result<Arrival, ExplorerError> {
        self.motors.set_velocity(velocity).await?;

        let arrival = if guarded {
            tokio::select! {
                _ = tokio::time::sleep(hold) => Arrival::Reached,
                _ = self.gate.wait_raised() => Arrival::Blocked,
            }
        } else {
            tokio::time::sleep(hold).await;
            Arrival::Reached
        };

        self.motors.stop().await?;
        self.motors
            .wait_movement_ended(Duration::from_millis(self.config.settle_timeout_ms))
            .await?;
        Ok(arrival)
    }

    /// Approach `point` up to the stand-off distance, photograph it and
    /// publish the result.
    pub async fn visit_and_photograph(&self, point: Point) -> Result<Photo, ExplorerError> {
        let pose = self.motors.actual_position().await?;
        let plan = plan_to(
            facing_from(pose, point),
            pose,
            self.config.standoff,
            self.config.heading_convention,
        );
        let arrival = self.execute(plan).await?;

        let frame = self.capture().await?;
        let brightness = frame.mean_brightness();
        let photo = Photo {
            target: point,
            arrival,
            width: frame.width,
            height: frame.height,
            brightness,
            looks_like_object: brightness > self.config.object_brightness,
        };
        info!(
            x = point.x,
            y = point.y,
            brightness,
            looks_like_object = photo.looks_like_object,
            "photograph taken"
        );

        self.bus.publish(
            Topic::Mapping,
            SOURCE,
            EventPayload::PhotoCaptured {
                target: point,
                width: photo.width,
                height: photo.height,
                looks_like_object: photo.looks_like_object,
            },
        );
        Ok(photo)
    }

    async fn capture(&self) -> Result<CameraFrame, ExplorerError> {
        let camera = self.camera.clone();
        tokio::task::spawn_blocking(move || {
            let mut camera = camera.lock().map_err(|e| ExplorerError::HardwareFault {
                component: FRONT_CAMERA_ID.to_string(),
                details: e.to_string(),
            })?;
            camera.capture()
        })
        .await
        .map_err(|e| ExplorerError::HardwareFault {
            component: FRONT_CAMERA_ID.to_string(),
            details: e.to_string(),
        })?
    }
}

/// Target pose at `point`, facing along the line from `pose`.
fn facing_from(pose: Pose, point: Point) -> Pose {
    let heading = (point.y - pose.y).atan2(point.x - pose.x);
    Pose::new(point.x, point.y, heading)
}

/// Whole milliseconds needed to cover `amount` at `max_rate`, at least one.
fn segment_time(amount: f64, max_rate: f64) -> Duration {
    let ms = (amount / max_rate.abs() * 1000.0).ceil();
    Duration::from_millis(if ms.is_finite() { ms.max(1.0) as u64 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use epuck_hal::sim::{ArenaConfig, SimCamera, SimObject, SimWheels, SimWorld};
    use epuck_kernel::{MotorSerializer, SerializerConfig, StateVerifier};
    use epuck_perception::sensor::SensorGeometry;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::{Arc, Mutex};

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn plan_straight_ahead_has_no_turns() {
        let plan = plan_to(Pose::new(100.0, 0.0, 0.0), Pose::origin(), 0.0, 0.0);
        assert!(close(plan.rotate1, 0.0, 1e-12));
        assert!(close(plan.translate, 100.0, 1e-12));
        assert!(close(plan.rotate2, 0.0, 1e-12));
    }

    #[test]
    fn plan_turns_the_short_way() {
        // Target behind-left, final heading pointing back at the start.
        let plan = plan_to(Pose::new(0.0, 100.0, -FRAC_PI_2), Pose::new(0.0, 0.0, 0.0), 0.0, 0.0);
        assert!(close(plan.rotate1, FRAC_PI_2, 1e-12));
        assert!(close(plan.translate, 100.0, 1e-9));
        assert!(close(plan.rotate2.abs(), PI, 1e-12));

        let plan = plan_to(Pose::new(0.0, -50.0, 0.0), Pose::new(0.0, 0.0, 0.1), 0.0, 0.0);
        assert!(close(plan.rotate1, -FRAC_PI_2 - 0.1, 1e-12));
        assert!(close(plan.rotate2, FRAC_PI_2, 1e-12));
    }

    #[test]
    fn standoff_never_reverses() {
        let plan = plan_to(Pose::new(30.0, 40.0, 0.0), Pose::origin(), 80.0, 0.0);
        assert_eq!(plan.translate, 0.0);
        let plan = plan_to(Pose::new(300.0, 400.0, 0.0), Pose::origin(), 80.0, 0.0);
        assert!(close(plan.translate, 420.0, 1e-9));
    }

    #[test]
    fn coincident_target_only_turns() {
        let plan = plan_to(Pose::new(5.0, 5.0, 1.0), Pose::new(5.0, 5.0, 0.25), 0.0, 0.0);
        assert_eq!(plan.translate, 0.0);
        assert_eq!(plan.rotate1, 0.0);
        assert!(close(plan.rotate2, 0.75, 1e-12));
    }

    #[test]
    fn heading_convention_shifts_the_first_turn() {
        let plan = plan_to(Pose::new(100.0, 0.0, 0.0), Pose::origin(), 0.0, 0.2);
        assert!(close(plan.rotate1, -0.2, 1e-12));
        assert!(close(plan.rotate2, 0.2, 1e-12));
    }

    #[test]
    fn segment_time_rounds_up_to_whole_milliseconds() {
        assert_eq!(segment_time(100.0, 400.0), Duration::from_millis(250));
        assert_eq!(segment_time(100.0, 300.0), Duration::from_millis(334));
        assert_eq!(segment_time(1e-9, 400.0), Duration::from_millis(1));
    }

    fn empty_arena() -> ArenaConfig {
        ArenaConfig {
            start: Pose::new(100.0, 100.0, 0.0),
            objects: Vec::new(),
            range_bias: 0.0,
            ..Default::default()
        }
    }

    fn planner_in(world: &SimWorld, gate: ObstacleGate) -> (DisplacementPlanner, EventBus) {
        let (motors, _task) = MotorSerializer::spawn(
            Box::new(SimWheels::new(world.clone())),
            OdometryParams::default(),
            StateVerifier::with_defaults(1100.0),
            SerializerConfig::default(),
        );
        let camera: SharedCamera = Arc::new(Mutex::new(Box::new(SimCamera::new(world.clone()))));
        let bus = EventBus::default();
        let planner = DisplacementPlanner::new(
            motors,
            gate,
            camera,
            bus.clone(),
            OdometryParams::default(),
            MotionConfig::default(),
        );
        (planner, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn execute_reaches_the_target() {
        let world = SimWorld::new(empty_arena(), OdometryParams::default(), SensorGeometry::default());
        let (planner, _bus) = planner_in(&world, ObstacleGate::never());

        let target = Pose::new(230.0, -170.0, 1.0);
        let start = planner.motors().actual_position().await.unwrap();
        let plan = plan_to(target, start, 0.0, 0.0);
        assert_eq!(planner.execute(plan).await.unwrap(), Arrival::Reached);

        let pose = planner.motors().actual_position().await.unwrap();
        assert!(close(pose.x, 230.0, 1e-6), "{pose:?}");
        assert!(close(pose.y, -170.0, 1e-6), "{pose:?}");
        assert!(close(shortest_rotation(pose.theta - 1.0), 0.0, 1e-9), "{pose:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn robot_displacement_keeps_the_standoff() {
        let world = SimWorld::new(empty_arena(), OdometryParams::default(), SensorGeometry::default());
        let (planner, _bus) = planner_in(&world, ObstacleGate::never());

        let plan = planner
            .robot_displacement(Pose::new(300.0, 400.0, 0.0))
            .await
            .unwrap();
        let bearing = 400.0_f64.atan2(300.0);
        assert!(close(plan.rotate1, bearing, 1e-12));
        assert!(close(plan.translate, 500.0 - 80.0, 1e-9));
        assert!(close(plan.rotate2, -bearing, 1e-12));

        // Planning alone does not move the robot.
        assert_eq!(planner.motors().last_pose(), Pose::origin());
        let truth = world.true_pose().unwrap();
        assert!(close(truth.x, 100.0, 1e-9) && close(truth.y, 100.0, 1e-9), "{truth:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn rotate_by_turns_exactly() {
        let world = SimWorld::new(empty_arena(), OdometryParams::default(), SensorGeometry::default());
        let (planner, _bus) = planner_in(&world, ObstacleGate::never());

        for _ in 0..36 {
            planner.rotate_by(PI / 18.0).await.unwrap();
        }
        let pose = planner.motors().actual_position().await.unwrap();
        assert!(close(shortest_rotation(pose.theta), 0.0, 1e-9), "{pose:?}");
        assert!(close(pose.x, 0.0, 1e-9) && close(pose.y, 0.0, 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn raised_gate_blocks_translation_and_skips_final_turn() {
        let world = SimWorld::new(empty_arena(), OdometryParams::default(), SensorGeometry::default());
        let (flag, rx) = tokio::sync::watch::channel(false);
        let gate = ObstacleGate::from_receiver(rx);
        let (planner, _bus) = planner_in(&world, gate);

        let run = tokio::spawn({
            let planner = planner.clone();
            async move {
                planner
                    .execute(RobotDistance {
                        rotate1: 0.0,
                        translate: 400.0,
                        rotate2: FRAC_PI_2,
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        flag.send_replace(true);

        assert_eq!(run.await.unwrap().unwrap(), Arrival::Blocked);
        let pose = planner.motors().actual_position().await.unwrap();
        assert!(pose.x > 0.0 && pose.x < 400.0, "{pose:?}");
        assert!(close(pose.theta, 0.0, 1e-12));
    }

    #[tokio::test(start_paused = true)]
    async fn reversing_ignores_the_obstacle_gate() {
        let world = SimWorld::new(empty_arena(), OdometryParams::default(), SensorGeometry::default());
        let (_flag, rx) = tokio::sync::watch::channel(true);
        let (planner, _bus) = planner_in(&world, ObstacleGate::from_receiver(rx));

        assert_eq!(planner.translate_by(-40.0).await.unwrap(), Arrival::Reached);
        let pose = planner.motors().actual_position().await.unwrap();
        assert!(close(pose.x, -40.0, 1e-6), "{pose:?}");
        assert!(close(world.true_pose().unwrap().x, 60.0, 1e-6));

        assert_eq!(planner.translate_by(40.0).await.unwrap(), Arrival::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn photograph_publishes_result() {
        let arena = ArenaConfig {
            objects: vec![SimObject {
                center: Point::new(300.0, 100.0),
                radius: 20.0,
            }],
            ..empty_arena()
        };
        let world = SimWorld::new(arena, OdometryParams::default(), SensorGeometry::default());
        let (planner, bus) = planner_in(&world, ObstacleGate::never());
        let mut mapping = bus.subscribe(Topic::Mapping);

        // Surface of the object as seen in the odometry frame.
        let photo = planner.visit_and_photograph(Point::new(180.0, 0.0)).await.unwrap();
        assert_eq!(photo.arrival, Arrival::Reached);
        assert!(photo.looks_like_object);
        assert_eq!(world.captures().unwrap(), 1);

        let pose = planner.motors().actual_position().await.unwrap();
        assert!(close(pose.x, 100.0, 1e-6), "{pose:?}");

        let event = mapping.try_recv().expect("photo event");
        assert!(matches!(
            event.payload,
            EventPayload::PhotoCaptured { looks_like_object: true, .. }
        ));
    }
}
