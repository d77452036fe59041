//! `epuck-hal` – Hardware abstraction layer.
//!
//! Traits for every device the explorer talks to, a registry that hands one
//! driver per role to its owner, and a simulated robot.
//!
//! # Modules
//!
//! - [`actuator`] – [`WheelActuator`][actuator::WheelActuator]
//! - [`range`] – [`RangeSensor`][range::RangeSensor] and the offset-correcting
//!   [`CalibratedRange`][range::CalibratedRange]
//! - [`proximity`] – [`ProximitySensor`][proximity::ProximitySensor] and the
//!   two-point [`CalibratedProximity`][proximity::CalibratedProximity]
//! - [`camera`] – [`Camera`][camera::Camera]
//! - [`alert`] – [`AlertPlayer`][alert::AlertPlayer]
//! - [`registry`] – [`HardwareRegistry`][registry::HardwareRegistry] and
//!   [`HardwareSet`][registry::HardwareSet]
//! - [`sim`] / [`sim_registry`] – in-process simulated robot

pub mod actuator;
pub mod alert;
pub mod camera;
pub mod proximity;
pub mod range;
pub mod registry;
pub mod sim;
pub mod sim_registry;
