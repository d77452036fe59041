//! [`HardwareRegistry`] – driver registry and [`HardwareSet`] assembly.
//!
//! Drivers register under their identifier.  Once every driver is in, the
//! registry is turned into a [`HardwareSet`]: one driver per role, looked up
//! by the well-known identifiers below.  Each role then moves to its single
//! owner (the motor serializer takes the wheels, the explorer the rest).

use std::collections::HashMap;

use epuck_types::ExplorerError;

use crate::actuator::WheelActuator;
use crate::alert::AlertPlayer;
use crate::camera::Camera;
use crate::proximity::ProximitySensor;
use crate::range::RangeSensor;

pub const WHEELS_ID: &str = "wheels";
pub const FRONT_RANGE_ID: &str = "front_tof";
pub const PROXIMITY_ID: &str = "ir_ring";
pub const FRONT_CAMERA_ID: &str = "front_camera";
pub const SPEAKER_ID: &str = "speaker";

/// One driver per role.
pub struct HardwareSet {
    pub wheels: Box<dyn WheelActuator>,
    pub range: Box<dyn RangeSensor>,
    pub proximity: Box<dyn ProximitySensor>,
    pub camera: Box<dyn Camera>,
    pub alerts: Box<dyn AlertPlayer>,
}

/// Central hardware driver registry.
#[derive(Default)]
pub struct HardwareRegistry {
    wheels: HashMap<String, Box<dyn WheelActuator>>,
    ranges: HashMap<String, Box<dyn RangeSensor>>,
    proximity: HashMap<String, Box<dyn ProximitySensor>>,
    cameras: HashMap<String, Box<dyn Camera>>,
    speakers: HashMap<String, Box<dyn AlertPlayer>>,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wheel driver.  Any previously registered driver with the
    /// same `id` is replaced.
    pub fn register_wheels(&mut self, wheels: Box<dyn WheelActuator>) {
        self.wheels.insert(wheels.id().to_string(), wheels);
    }

    pub fn register_range(&mut self, range: Box<dyn RangeSensor>) {
        self.ranges.insert(range.id().to_string(), range);
    }

    pub fn register_proximity(&mut self, proximity: Box<dyn ProximitySensor>) {
        self.proximity.insert(proximity.id().to_string(), proximity);
    }

    pub fn register_camera(&mut self, camera: Box<dyn Camera>) {
        self.cameras.insert(camera.id().to_string(), camera);
    }

    pub fn register_speaker(&mut self, speaker: Box<dyn AlertPlayer>) {
        self.speakers.insert(speaker.id().to_string(), speaker);
    }

    /// Take the drivers registered under the well-known identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] naming the first missing
    /// driver.
    pub fn into_hardware_set(mut self) -> Result<HardwareSet, ExplorerError> {
        Ok(HardwareSet {
            wheels: take(&mut self.wheels, WHEELS_ID)?,
            range: take(&mut self.ranges, FRONT_RANGE_ID)?,
            proximity: take(&mut self.proximity, PROXIMITY_ID)?,
            camera: take(&mut self.cameras, FRONT_CAMERA_ID)?,
            alerts: take(&mut self.speakers, SPEAKER_ID)?,
        })
    }
}

fn take<T: ?Sized>(map: &mut HashMap<String, Box<T>>, id: &str) -> Result<Box<T>, ExplorerError> {
    map.remove(id).ok_or_else(|| ExplorerError::HardwareFault {
        component: id.to_string(),
        details: format!("driver '{id}' is not registered"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraFrame;
    use crate::proximity::PROXIMITY_SENSORS;
    use epuck_types::{Melody, WheelVelocity};

    struct MockWheels(&'static str, WheelVelocity);
    impl WheelActuator for MockWheels {
        fn id(&self) -> &str {
            self.0
        }
        fn set_wheel_velocity(&mut self, velocity: WheelVelocity) -> Result<(), ExplorerError> {
            self.1 = velocity;
            Ok(())
        }
        fn velocity(&self) -> WheelVelocity {
            self.1
        }
    }

    struct MockRange;
    impl RangeSensor for MockRange {
        fn id(&self) -> &str {
            FRONT_RANGE_ID
        }
        fn read_range(&mut self) -> Result<f64, ExplorerError> {
            Ok(100.0)
        }
    }

    struct MockRing;
    impl ProximitySensor for MockRing {
        fn id(&self) -> &str {
            PROXIMITY_ID
        }
        fn read_deltas(&mut self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError> {
            Ok([0.0; PROXIMITY_SENSORS])
        }
    }

    struct MockCamera;
    impl Camera for MockCamera {
        fn id(&self) -> &str {
            FRONT_CAMERA_ID
        }
        fn capture(&mut self) -> Result<CameraFrame, ExplorerError> {
            Ok(CameraFrame {
                width: 1,
                height: 1,
                data: vec![0u8],
            })
        }
    }

    struct MockSpeaker;
    impl AlertPlayer for MockSpeaker {
        fn id(&self) -> &str {
            SPEAKER_ID
        }
        fn play_melody(&mut self, _melody: Melody) -> Result<(), ExplorerError> {
            Ok(())
        }
        fn wait_for_melody_end(&mut self) -> Result<(), ExplorerError> {
            Ok(())
        }
    }

    fn full_registry() -> HardwareRegistry {
        let mut registry = HardwareRegistry::new();
        registry.register_wheels(Box::new(MockWheels(WHEELS_ID, WheelVelocity::STOP)));
        registry.register_range(Box::new(MockRange));
        registry.register_proximity(Box::new(MockRing));
        registry.register_camera(Box::new(MockCamera));
        registry.register_speaker(Box::new(MockSpeaker));
        registry
    }

    #[test]
    fn complete_registry_builds_a_set() {
        let mut set = full_registry().into_hardware_set().unwrap();
        set.wheels.set_wheel_velocity(WheelVelocity::straight(10.0)).unwrap();
        assert_eq!(set.wheels.velocity(), WheelVelocity::straight(10.0));
        assert_eq!(set.range.read_range().unwrap(), 100.0);
        assert_eq!(set.proximity.id(), PROXIMITY_ID);
    }

    #[test]
    fn missing_driver_is_a_hardware_fault() {
        let mut registry = HardwareRegistry::new();
        registry.register_range(Box::new(MockRange));
        let err = registry.into_hardware_set().err().unwrap();
        assert_eq!(
            err,
            ExplorerError::HardwareFault {
                component: WHEELS_ID.to_string(),
                details: "driver 'wheels' is not registered".to_string(),
            }
        );
    }

    #[test]
    fn wrongly_named_driver_is_not_picked() {
        let mut registry = full_registry();
        registry.wheels.clear();
        registry.register_wheels(Box::new(MockWheels("spare_wheels", WheelVelocity::STOP)));
        assert!(registry.into_hardware_set().is_err());
    }
}
