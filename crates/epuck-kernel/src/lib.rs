//! `epuck-kernel` – Motion ownership & safety
//!
//! Owns the wheels and the pose.  It does not plan; it serializes motor
//! commands, keeps odometry consistent with them and refuses unsafe ones.
//!
//! # Modules
//!
//! - [`motor_serializer`] – [`MotorSerializer`][motor_serializer::MotorSerializer]:
//!   the single task that writes wheel velocities and integrates the pose,
//!   driven through a cloneable [`MotorHandle`][motor_serializer::MotorHandle].
//! - [`state_verifier`] – [`StateVerifier`][state_verifier::StateVerifier]:
//!   rule engine applied to every wheel command (finite rates, speed cap).
//! - [`obstacle_watch`] – [`ObstacleWatch`][obstacle_watch::ObstacleWatch]:
//!   polls the front sensor and raises the obstacle gate for early stops.

pub mod motor_serializer;
pub mod obstacle_watch;
pub mod state_verifier;

pub use motor_serializer::{MotionState, MotorCommand, MotorHandle, MotorSerializer, SerializerConfig};
pub use obstacle_watch::{ObstacleConfig, ObstacleGate, ObstacleWatch};
pub use state_verifier::{FiniteVelocityRule, Rule, StateVerifier, WheelSpeedCapRule};
