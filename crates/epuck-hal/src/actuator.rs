//! `WheelActuator` trait for the differential-drive motors.
//!
//! Only the motor command serializer holds a wheel actuator; every other part
//! of the system moves the robot through its handle.

use epuck_types::{ExplorerError, WheelVelocity};

/// Left/right wheel motor pair.
pub trait WheelActuator: Send + Sync {
    /// Stable identifier, e.g. `"wheels"`.
    fn id(&self) -> &str;

    /// Start turning the wheels at `velocity`.  Returns as soon as the
    /// command is written; the motors keep the rate until the next call.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] if the motor driver rejects
    /// the command.
    fn set_wheel_velocity(&mut self, velocity: WheelVelocity) -> Result<(), ExplorerError>;

    /// The most recently written velocity.
    fn velocity(&self) -> WheelVelocity;
}
