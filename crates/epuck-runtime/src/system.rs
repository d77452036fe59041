//! [`RobotSystem`] – wires a [`HardwareSet`] into a running explorer.
//!
//! Starting a system spawns the motor serializer, a task forwarding every
//! odometry pose to the bus as [`EventPayload::PoseUpdate`] and, when
//! enabled, the obstacle watch.  Activities are then requested through the
//! [`ActionDispatcher`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use epuck_hal::proximity::CalibratedProximity;
use epuck_hal::range::CalibratedRange;
use epuck_hal::registry::HardwareSet;
use epuck_kernel::{
    MotorHandle, MotorSerializer, ObstacleConfig, ObstacleGate, ObstacleWatch, SerializerConfig,
    StateVerifier,
};
use epuck_middleware::{EventBus, Topic};
use epuck_perception::odometry::OdometryParams;
use epuck_perception::sensor::SensorGeometry;
use epuck_perception::tracker::TrackerConfig;
use epuck_perception::walls::WallsConfig;
use epuck_types::EventPayload;

use crate::dispatcher::ActionDispatcher;
use crate::explorer::{Explorer, ExplorerConfig};
use crate::planner::{DisplacementPlanner, MotionConfig};

const SOURCE: &str = "epuck-runtime::system";

/// Every tunable of the running system, one section per component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub odometry: OdometryParams,
    pub sensor: SensorGeometry,
    pub walls: WallsConfig,
    pub tracker: TrackerConfig,
    pub motion: MotionConfig,
    pub serializer: SerializerConfig,
    pub obstacle: ObstacleConfig,
    pub explorer: ExplorerConfig,
}

pub struct RobotSystem {
    dispatcher: ActionDispatcher,
    explorer: Explorer,
    motors: MotorHandle,
    bus: EventBus,
    serializer: JoinHandle<()>,
    poses: JoinHandle<()>,
    watch: Option<ObstacleWatch>,
    settle: Duration,
}

impl RobotSystem {
    /// Must be called from within a tokio runtime.
    pub fn start(hardware: HardwareSet, config: &SystemConfig, bus: EventBus) -> Self {
        let HardwareSet {
            wheels,
            range,
            proximity,
            camera,
            alerts,
        } = hardware;

        let range = CalibratedRange::new(range).shared();
        let proximity = CalibratedProximity::new(proximity).shared();
        let (motors, serializer) = MotorSerializer::spawn(
            wheels,
            config.odometry,
            StateVerifier::with_defaults(config.serializer.max_wheel_speed),
            config.serializer,
        );
        let poses = spawn_pose_forwarder(&motors, bus.clone());

        let (watch, gate) = if config.obstacle.enabled {
            let (watch, gate) = ObstacleWatch::spawn(range.clone(), config.obstacle);
            (Some(watch), gate)
        } else {
            (None, ObstacleGate::never())
        };

        let planner = DisplacementPlanner::new(
            motors.clone(),
            gate,
            Arc::new(Mutex::new(camera)),
            bus.clone(),
            config.odometry,
            config.motion,
        );
        let explorer = Explorer::new(
            planner,
            range,
            proximity,
            Arc::new(Mutex::new(alerts)),
            bus.clone(),
            config,
        );
        let dispatcher = ActionDispatcher::new(explorer.clone());

        info!(obstacle_watch = config.obstacle.enabled, "robot system started");
        Self {
            dispatcher,
            explorer,
            motors,
            bus,
            serializer,
            poses,
            watch,
            settle: Duration::from_millis(config.motion.settle_timeout_ms),
        }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    pub fn motors(&self) -> &MotorHandle {
        &self.motors
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stop the wheels, end the obstacle watch and wait for the serializer.
    ///
    /// An activity still running keeps the serializer alive; after the settle
    /// timeout the serializer task is aborted.
    pub async fn shutdown(self) {
        if let Err(e) = self.motors.stop().await {
            warn!(error = %e, "stop on shutdown failed");
        }
        if let Some(watch) = self.watch {
            watch.shutdown().await;
        }
        self.poses.abort();

        drop(self.dispatcher);
        drop(self.explorer);
        drop(self.motors);

        let mut serializer = self.serializer;
        if tokio::time::timeout(self.settle, &mut serializer).await.is_err() {
            warn!("serializer still busy, aborting");
            serializer.abort();
        }
        info!("robot system stopped");
    }
}

/// Publish each pose the serializer reports, until it stops.
fn spawn_pose_forwarder(motors: &MotorHandle, bus: EventBus) -> JoinHandle<()> {
    let mut poses = motors.subscribe_pose();
    tokio::spawn(async move {
        while poses.changed().await.is_ok() {
            let pose = *poses.borrow_and_update();
            bus.publish(Topic::Telemetry, SOURCE, EventPayload::PoseUpdate(pose));
        }
    })
}
