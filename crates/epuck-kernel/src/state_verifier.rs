//! [`StateVerifier`] – wheel-command safety interlock.
//!
//! The motor serializer passes every requested [`WheelVelocity`] through
//! [`StateVerifier::verify`] before it reaches the motors.  Rules are
//! evaluated in order; the first violation returns
//! [`ExplorerError::UnsafeCommand`] and the command is not applied.
//!
//! Built-in rules:
//! - [`FiniteVelocityRule`] – rejects NaN or infinite wheel rates.
//! - [`WheelSpeedCapRule`] – rejects wheel rates above the motor limit.

use epuck_types::{ExplorerError, WheelVelocity};

/// A single invariant a wheel command must satisfy.
pub trait Rule: Send + Sync {
    /// Human-readable name used in rejection messages.
    fn name(&self) -> &str;

    fn check(&self, velocity: &WheelVelocity) -> Result<(), ExplorerError>;
}

/// Rule engine applied to every wheel command.
///
/// # Example
///
/// ```
/// use epuck_kernel::state_verifier::StateVerifier;
/// use epuck_types::WheelVelocity;
///
/// let verifier = StateVerifier::with_defaults(1100.0);
/// assert!(verifier.verify(&WheelVelocity::straight(500.0)).is_ok());
/// assert!(verifier.verify(&WheelVelocity::spin(2000.0)).is_err());
/// ```
#[derive(Default)]
pub struct StateVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl StateVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finite-value check followed by a per-wheel cap of `max_wheel_speed`.
    pub fn with_defaults(max_wheel_speed: f64) -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(FiniteVelocityRule));
        verifier.add_rule(Box::new(WheelSpeedCapRule { max_wheel_speed }));
        verifier
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Return the first violation, or `Ok(())` when every rule passes.
    pub fn verify(&self, velocity: &WheelVelocity) -> Result<(), ExplorerError> {
        for rule in &self.rules {
            rule.check(velocity)?;
        }
        Ok(())
    }
}

pub struct FiniteVelocityRule;

impl Rule for FiniteVelocityRule {
    fn name(&self) -> &str {
        "finite_velocity"
    }

    fn check(&self, velocity: &WheelVelocity) -> Result<(), ExplorerError> {
        if velocity.left.is_finite() && velocity.right.is_finite() {
            return Ok(());
        }
        Err(ExplorerError::UnsafeCommand {
            rule: self.name().to_string(),
            details: format!("wheel rates ({}, {}) are not finite", velocity.left, velocity.right),
        })
    }
}

/// Rejects commands where either wheel exceeds `max_wheel_speed` in magnitude.
pub struct WheelSpeedCapRule {
    pub max_wheel_speed: f64,
}

impl Rule for WheelSpeedCapRule {
    fn name(&self) -> &str {
        "wheel_speed_cap"
    }

    fn check(&self, velocity: &WheelVelocity) -> Result<(), ExplorerError> {
        for (wheel, rate) in [("left", velocity.left), ("right", velocity.right)] {
            if rate.abs() > self.max_wheel_speed {
                return Err(ExplorerError::UnsafeCommand {
                    rule: self.name().to_string(),
                    details: format!("{wheel} wheel rate {rate} exceeds cap {}", self.max_wheel_speed),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_verifier_accepts_anything() {
        assert!(StateVerifier::new().verify(&WheelVelocity::straight(1e9)).is_ok());
    }

    #[test]
    fn speed_cap_names_the_offending_wheel() {
        let verifier = StateVerifier::with_defaults(1000.0);
        let err = verifier.verify(&WheelVelocity::new(100.0, -1200.0)).unwrap_err();
        match err {
            ExplorerError::UnsafeCommand { rule, details } => {
                assert_eq!(rule, "wheel_speed_cap");
                assert!(details.contains("right"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn cap_is_inclusive() {
        let verifier = StateVerifier::with_defaults(1000.0);
        assert!(verifier.verify(&WheelVelocity::spin(1000.0)).is_ok());
    }

    #[test]
    fn nan_is_rejected_before_the_cap() {
        let verifier = StateVerifier::with_defaults(1000.0);
        let err = verifier.verify(&WheelVelocity::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, ExplorerError::UnsafeCommand { ref rule, .. } if rule == "finite_velocity"));
    }

    #[test]
    fn stop_always_passes() {
        assert!(StateVerifier::with_defaults(0.0).verify(&WheelVelocity::STOP).is_ok());
    }
}
