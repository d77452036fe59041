//! Motor command serializer.
//!
//! One tokio task owns the wheels, the robot [`Pose`] and the currently
//! commanded velocity with the instant it was applied.  Everything else talks
//! to it through a [`MotorHandle`]: each request is a [`MotorCommand`] sent
//! over an mpsc mailbox and answered on a oneshot channel, so the caller
//! resumes only once the command took effect.
//!
//! Because the task is the only writer, odometry updates happen strictly in
//! mailbox order and every interval of real time is charged to the velocity
//! that was actually active during it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use epuck_kernel::motor_serializer::{MotorSerializer, SerializerConfig};
//! use epuck_kernel::state_verifier::StateVerifier;
//! use epuck_types::WheelVelocity;
//! # async fn demo(wheels: Box<dyn epuck_hal::actuator::WheelActuator>) -> Result<(), epuck_types::ExplorerError> {
//! let (motors, _task) = MotorSerializer::spawn(
//!     wheels,
//!     Default::default(),
//!     StateVerifier::with_defaults(1100.0),
//!     SerializerConfig::default(),
//! );
//! motors.set_velocity(WheelVelocity::straight(200.0)).await?;
//! tokio::time::sleep(Duration::from_secs(1)).await;
//! let pose = motors.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use epuck_hal::actuator::WheelActuator;
use epuck_perception::frame::FrameTransform;
use epuck_perception::odometry::{OdometryParams, integrate};
use epuck_types::{ExplorerError, Pose, WheelVelocity};

use crate::state_verifier::StateVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Longest wait for the serializer to acknowledge a command.
    pub ack_timeout_ms: u64,
    pub mailbox_capacity: usize,
    /// Per-wheel rate limit enforced on every command.
    pub max_wheel_speed: f64,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1000,
            mailbox_capacity: 32,
            max_wheel_speed: 1100.0,
        }
    }
}

impl SerializerConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Whether the wheels are currently commanded to turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Moving,
    Stopped,
}

type Ack = oneshot::Sender<Result<Pose, ExplorerError>>;

/// Mailbox messages.  Every variant is answered with the pose as it stands
/// after the command.
#[derive(Debug)]
pub enum MotorCommand {
    SetVelocity { velocity: WheelVelocity, ack: Ack },
    Stop { ack: Ack },
    /// Integrate up to now without changing the velocity.
    Sync { ack: Ack },
    /// Put the robot back on the origin.
    ResetCoordinates { ack: Ack },
    /// Re-express the pose in a new frame, once.
    ApplyFrame { transform: FrameTransform, ack: Ack },
}

pub struct MotorSerializer {
    wheels: Box<dyn WheelActuator>,
    params: OdometryParams,
    verifier: StateVerifier,
    pose: Pose,
    /// Velocity in force and the instant the pose was last integrated to.
    active: Option<(WheelVelocity, Instant)>,
    pose_tx: watch::Sender<Pose>,
    motion_tx: watch::Sender<MotionState>,
}

impl MotorSerializer {
    /// Start the serializer task.  The pose starts at the origin.
    ///
    /// The task exits, after writing a final stop to the wheels, once every
    /// [`MotorHandle`] has been dropped.
    pub fn spawn(
        wheels: Box<dyn WheelActuator>,
        params: OdometryParams,
        verifier: StateVerifier,
        config: SerializerConfig,
    ) -> (MotorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (pose_tx, pose_rx) = watch::channel(Pose::origin());
        let (motion_tx, motion_rx) = watch::channel(MotionState::Stopped);

        let serializer = MotorSerializer {
            wheels,
            params,
            verifier,
            pose: Pose::origin(),
            active: None,
            pose_tx,
            motion_tx,
        };
        let task = tokio::spawn(serializer.run(rx));

        let handle = MotorHandle {
            tx,
            pose_rx,
            motion_rx,
            ack_timeout: config.ack_timeout(),
        };
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<MotorCommand>) {
        info!(wheels = self.wheels.id(), "motor serializer started");

        while let Some(command) = rx.recv().await {
            self.handle(command);
        }

        self.sync(Instant::now());
        if let Err(e) = self.wheels.set_wheel_velocity(WheelVelocity::STOP) {
            error!(error = %e, "final stop failed");
        }
        self.motion_tx.send_replace(MotionState::Stopped);
        info!(x = self.pose.x, y = self.pose.y, theta = self.pose.theta, "motor serializer stopped");
    }

    fn handle(&mut self, command: MotorCommand) {
        let now = Instant::now();
        let (result, ack) = match command {
            MotorCommand::SetVelocity { velocity, ack } => (self.apply_velocity(velocity, now), ack),
            MotorCommand::Stop { ack } => (self.apply_velocity(WheelVelocity::STOP, now), ack),
            MotorCommand::Sync { ack } => {
                self.sync(now);
                (Ok(self.pose), ack)
            }
            MotorCommand::ResetCoordinates { ack } => {
                self.sync(now);
                self.replace_pose(Pose::origin());
                (Ok(self.pose), ack)
            }
            MotorCommand::ApplyFrame { transform, ack } => {
                self.sync(now);
                self.replace_pose(transform.apply_pose(self.pose));
                (Ok(self.pose), ack)
            }
        };
        self.pose_tx.send_replace(self.pose);
        // The caller may have timed out and gone away.
        let _ = ack.send(result);
    }

    /// Charge the time since the last update to the active velocity.  Before
    /// the first command there is nothing to charge.
    fn sync(&mut self, now: Instant) {
        if let Some((velocity, since)) = self.active {
            self.pose = integrate(self.pose, velocity, now.duration_since(since), &self.params);
            self.active = Some((velocity, now));
        }
    }

    fn replace_pose(&mut self, pose: Pose) {
        debug!(x = pose.x, y = pose.y, theta = pose.theta, "pose replaced");
        self.pose = pose;
    }

    fn apply_velocity(&mut self, velocity: WheelVelocity, now: Instant) -> Result<Pose, ExplorerError> {
        self.sync(now);

        if let Err(e) = self.verifier.verify(&velocity) {
            warn!(left = velocity.left, right = velocity.right, error = %e, "wheel command rejected");
            return Err(e);
        }
        self.wheels.set_wheel_velocity(velocity)?;
        self.active = Some((velocity, now));

        let state = if velocity.is_stop() {
            MotionState::Stopped
        } else {
            MotionState::Moving
        };
        self.motion_tx.send_replace(state);
        debug!(left = velocity.left, right = velocity.right, x = self.pose.x, y = self.pose.y, "wheel velocity set");
        Ok(self.pose)
    }
}

/// Cloneable handle to the serializer task.
#[derive(Clone)]
pub struct MotorHandle {
    tx: mpsc::Sender<MotorCommand>,
    pose_rx: watch::Receiver<Pose>,
    motion_rx: watch::Receiver<MotionState>,
    ack_timeout: Duration,
}

impl MotorHandle {
    async fn request(
        &self,
        operation: &str,
        make: impl FnOnce(Ack) -> MotorCommand,
    ) -> Result<Pose, ExplorerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(make(ack_tx))
                .await
                .map_err(|_| ExplorerError::SerializerStopped)?;
            ack_rx.await.map_err(|_| ExplorerError::SerializerStopped)?
        };
        tokio::time::timeout(self.ack_timeout, exchange)
            .await
            .map_err(|_| ExplorerError::Timeout {
                operation: operation.to_string(),
                after_ms: self.ack_timeout.as_millis() as u64,
            })?
    }

    /// Switch the wheels to `velocity`; returns the pose at the switch.
    pub async fn set_velocity(&self, velocity: WheelVelocity) -> Result<Pose, ExplorerError> {
        self.request("set_velocity", |ack| MotorCommand::SetVelocity { velocity, ack })
            .await
    }

    pub async fn stop(&self) -> Result<Pose, ExplorerError> {
        self.request("stop", |ack| MotorCommand::Stop { ack }).await
    }

    /// Pose integrated up to this instant.
    pub async fn actual_position(&self) -> Result<Pose, ExplorerError> {
        self.request("actual_position", |ack| MotorCommand::Sync { ack }).await
    }

    pub async fn reset_coordinates(&self) -> Result<Pose, ExplorerError> {
        self.request("reset_coordinates", |ack| MotorCommand::ResetCoordinates { ack })
            .await
    }

    pub async fn apply_frame(&self, transform: FrameTransform) -> Result<Pose, ExplorerError> {
        self.request("apply_frame", |ack| MotorCommand::ApplyFrame { transform, ack })
            .await
    }

    /// Pose as of the last processed command, without a round trip.
    pub fn last_pose(&self) -> Pose {
        *self.pose_rx.borrow()
    }

    pub fn motion_state(&self) -> MotionState {
        *self.motion_rx.borrow()
    }

    /// Resolve once the wheels are stopped; immediately if they already are.
    pub async fn wait_movement_ended(&self, timeout: Duration) -> Result<(), ExplorerError> {
        let mut rx = self.motion_rx.clone();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == MotionState::Stopped))
            .await
            .map_err(|_| ExplorerError::Timeout {
                operation: "movement end".to_string(),
                after_ms: timeout.as_millis() as u64,
            })?
            .map(|_| ())
            .map_err(|_| ExplorerError::SerializerStopped)
    }

    /// Pose snapshots published after every command.
    pub fn subscribe_pose(&self) -> watch::Receiver<Pose> {
        self.pose_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingWheels {
        log: Arc<Mutex<Vec<WheelVelocity>>>,
    }

    impl RecordingWheels {
        fn written(&self) -> Vec<WheelVelocity> {
            self.log.lock().unwrap().clone()
        }
    }

    impl WheelActuator for RecordingWheels {
        fn id(&self) -> &str {
            "wheels"
        }

        fn set_wheel_velocity(&mut self, velocity: WheelVelocity) -> Result<(), ExplorerError> {
            self.log.lock().unwrap().push(velocity);
            Ok(())
        }

        fn velocity(&self) -> WheelVelocity {
            self.log.lock().unwrap().last().copied().unwrap_or(WheelVelocity::STOP)
        }
    }

    fn start(wheels: RecordingWheels) -> (MotorHandle, JoinHandle<()>) {
        MotorSerializer::spawn(
            Box::new(wheels),
            OdometryParams::default(),
            StateVerifier::with_defaults(1100.0),
            SerializerConfig::default(),
        )
    }

    fn assert_pose(pose: Pose, x: f64, y: f64, theta: f64) {
        assert!((pose.x - x).abs() < 1e-9, "x {} != {x}", pose.x);
        assert!((pose.y - y).abs() < 1e-9, "y {} != {y}", pose.y);
        assert!((pose.theta - theta).abs() < 1e-9, "theta {} != {theta}", pose.theta);
    }

    #[tokio::test(start_paused = true)]
    async fn straight_second_at_200_reaches_200() {
        let (motors, _task) = start(RecordingWheels::default());
        motors.set_velocity(WheelVelocity::new(200.0, 200.0)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        let pose = motors.stop().await.unwrap();
        assert_pose(pose, 200.0, 0.0, 0.0);
        assert_pose(motors.last_pose(), 200.0, 0.0, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_command_only_sets_the_baseline() {
        let (motors, _task) = start(RecordingWheels::default());
        tokio::time::advance(Duration::from_secs(5)).await;
        motors.set_velocity(WheelVelocity::straight(100.0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pose(motors.actual_position().await.unwrap(), 100.0, 0.0, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_keeps_the_velocity() {
        let wheels = RecordingWheels::default();
        let (motors, _task) = start(wheels.clone());
        motors.set_velocity(WheelVelocity::straight(50.0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        motors.actual_position().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pose(motors.actual_position().await.unwrap(), 100.0, 0.0, 0.0);
        assert_eq!(wheels.written(), vec![WheelVelocity::straight(50.0)]);
        assert_eq!(motors.motion_state(), MotionState::Moving);
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_callers_match_sequential_replay() {
        let (motors, _task) = start(RecordingWheels::default());

        // Even intervals from different phases: the callers never arrive at
        // the same instant.
        let caller = |seed: u64, phase_ms: u64| {
            let motors = motors.clone();
            tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut log = Vec::new();
                if phase_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(phase_ms)).await;
                }
                for _ in 0..50 {
                    tokio::time::sleep(Duration::from_millis(2 * rng.gen_range(1..100u64))).await;
                    let v = WheelVelocity::new(rng.gen_range(-800.0..800.0), rng.gen_range(-800.0..800.0));
                    motors.set_velocity(v).await.unwrap();
                    log.push((Instant::now(), v));
                }
                log
            })
        };

        let a = caller(7, 0);
        let b = caller(11, 1);
        let mut arrivals = a.await.unwrap();
        arrivals.extend(b.await.unwrap());
        arrivals.sort_by_key(|(at, _)| *at);
        assert_eq!(arrivals.len(), 100);

        let end = Instant::now();
        let actual = motors.stop().await.unwrap();

        let params = OdometryParams::default();
        let mut expected = Pose::origin();
        for pair in arrivals.windows(2) {
            let ((t0, v0), (t1, _)) = (pair[0], pair[1]);
            expected = integrate(expected, v0, t1 - t0, &params);
        }
        if let Some((t_last, v_last)) = arrivals.last() {
            expected = integrate(expected, *v_last, end - *t_last, &params);
        }

        assert!((actual.x - expected.x).abs() < 1e-6);
        assert!((actual.y - expected.y).abs() < 1e-6);
        assert!((actual.theta - expected.theta).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_movement_waiters() {
        let (motors, _task) = start(RecordingWheels::default());
        motors.set_velocity(WheelVelocity::spin(100.0)).await.unwrap();

        let waiter = {
            let motors = motors.clone();
            tokio::spawn(async move { motors.wait_movement_ended(Duration::from_secs(10)).await })
        };
        tokio::time::advance(Duration::from_millis(300)).await;
        motors.stop().await.unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(motors.motion_state(), MotionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn movement_wait_times_out_while_moving() {
        let (motors, _task) = start(RecordingWheels::default());
        motors.set_velocity(WheelVelocity::straight(100.0)).await.unwrap();
        let err = motors.wait_movement_ended(Duration::from_millis(250)).await.unwrap_err();
        assert_eq!(
            err,
            ExplorerError::Timeout {
                operation: "movement end".to_string(),
                after_ms: 250
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsafe_command_keeps_previous_velocity() {
        let wheels = RecordingWheels::default();
        let (motors, _task) = start(wheels.clone());
        motors.set_velocity(WheelVelocity::straight(100.0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        let err = motors.set_velocity(WheelVelocity::straight(5000.0)).await.unwrap_err();
        assert!(matches!(err, ExplorerError::UnsafeCommand { .. }));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pose(motors.stop().await.unwrap(), 200.0, 0.0, 0.0);
        assert_eq!(
            wheels.written(),
            vec![WheelVelocity::straight(100.0), WheelVelocity::STOP]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_and_frame_replace_the_pose() {
        let (motors, _task) = start(RecordingWheels::default());
        motors.set_velocity(WheelVelocity::straight(100.0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_pose(motors.reset_coordinates().await.unwrap(), 0.0, 0.0, 0.0);

        // Still moving: the next second is charged from the reset onwards.
        tokio::time::advance(Duration::from_secs(1)).await;
        motors.stop().await.unwrap();

        let shift = FrameTransform::new(0.0, epuck_types::Point::new(10.0, 20.0));
        assert_pose(motors.apply_frame(shift).await.unwrap(), 110.0, 20.0, 0.0);

        let mut rx = motors.subscribe_pose();
        assert_pose(*rx.borrow_and_update(), 110.0, 20.0, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_stops_the_wheels() {
        let wheels = RecordingWheels::default();
        let (motors, task) = start(wheels.clone());
        motors.set_velocity(WheelVelocity::straight(300.0)).await.unwrap();
        drop(motors);
        task.await.unwrap();
        assert_eq!(wheels.velocity(), WheelVelocity::STOP);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_serializer_is_reported() {
        let (motors, task) = start(RecordingWheels::default());
        task.abort();
        let _ = task.await;
        assert_eq!(
            motors.actual_position().await.unwrap_err(),
            ExplorerError::SerializerStopped
        );
        assert_eq!(motors.stop().await.unwrap_err(), ExplorerError::SerializerStopped);
    }
}
