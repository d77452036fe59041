//! `epuck-perception` – Localisation and mapping layer.
//!
//! Turns commanded wheel velocities and front range readings into the robot's
//! picture of the arena.
//!
//! # Modules
//!
//! - [`odometry`] – [`integrate`][odometry::integrate]: dead-reckoning pose
//!   update from a wheel velocity held for an interval.
//! - [`frame`] – [`FrameTransform`][frame::FrameTransform]: 2-D rigid
//!   transform used to re-anchor the pose on the arena walls.
//! - [`sensor`] – [`SensorGeometry`][sensor::SensorGeometry]: projects range
//!   readings to world points.
//! - [`walls`] – [`locate_walls`][walls::locate_walls]: run segmentation, line
//!   fitting and corner detection over a full-turn scan.
//! - [`tracker`] – [`ObjectTracker`][tracker::ObjectTracker]: deduplicated
//!   list of objects inside the arena.

pub mod frame;
pub mod odometry;
pub mod sensor;
pub mod tracker;
pub mod walls;
