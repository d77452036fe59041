//! `epuck-runtime` – Activities and their orchestration
//!
//! Turns the kernel's serialized motion into the robot's work: planning
//! displacements, scanning, calibrating the frame on the arena walls,
//! tracking objects and reporting the map.
//!
//! # Modules
//!
//! - [`planner`] – [`DisplacementPlanner`][planner::DisplacementPlanner]:
//!   turn–drive–turn plans ([`plan_to`][planner::plan_to]) executed segment
//!   by segment, translations guarded by the obstacle gate; object visits
//!   end with a photograph.
//! - [`explorer`] – [`Explorer`][explorer::Explorer]: the discover, explore,
//!   calibrate and report activities.
//! - [`dispatcher`] – [`ActionDispatcher`][dispatcher::ActionDispatcher]:
//!   admits one activity at a time, keeps the history and signals the end of
//!   work.
//! - [`system`] – [`RobotSystem`][system::RobotSystem]: wires a hardware set,
//!   the serializer, the obstacle watch and the activities together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod dispatcher;
pub mod explorer;
pub mod planner;
pub mod system;
pub mod telemetry;

pub use dispatcher::{Activity, ActionDispatcher, DispatchState, DispatchStatus, History};
pub use explorer::{Explorer, ExplorerConfig, SensorCalibration};
pub use planner::{Arrival, DisplacementPlanner, MotionConfig, Photo, plan_to};
pub use system::{RobotSystem, SystemConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
