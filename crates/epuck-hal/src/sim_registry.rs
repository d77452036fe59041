//! [`SimRegistry`] – builds a [`HardwareRegistry`] backed by a [`SimWorld`].
//!
//! Every role defaults to the matching simulated driver; tests swap single
//! roles for their own doubles.
//!
//! # Example
//!
//! ```rust
//! use epuck_hal::sim::{ArenaConfig, SimWorld};
//! use epuck_hal::sim_registry::SimRegistry;
//!
//! let world = SimWorld::new(ArenaConfig::default(), Default::default(), Default::default());
//! let hardware = SimRegistry::new(world).build().into_hardware_set().unwrap();
//! assert_eq!(hardware.wheels.id(), "wheels");
//! ```

use crate::actuator::WheelActuator;
use crate::alert::AlertPlayer;
use crate::camera::Camera;
use crate::proximity::ProximitySensor;
use crate::range::RangeSensor;
use crate::registry::HardwareRegistry;
use crate::sim::{SimAlertPlayer, SimCamera, SimProximity, SimRangeSensor, SimWheels, SimWorld};

pub struct SimRegistry {
    world: SimWorld,
    wheels: Option<Box<dyn WheelActuator>>,
    range: Option<Box<dyn RangeSensor>>,
    proximity: Option<Box<dyn ProximitySensor>>,
    camera: Option<Box<dyn Camera>>,
    speaker: Option<Box<dyn AlertPlayer>>,
}

impl SimRegistry {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            wheels: None,
            range: None,
            proximity: None,
            camera: None,
            speaker: None,
        }
    }

    /// Use `wheels` instead of [`SimWheels`].
    pub fn with_wheels(mut self, wheels: Box<dyn WheelActuator>) -> Self {
        self.wheels = Some(wheels);
        self
    }

    pub fn with_range(mut self, range: Box<dyn RangeSensor>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_proximity(mut self, proximity: Box<dyn ProximitySensor>) -> Self {
        self.proximity = Some(proximity);
        self
    }

    pub fn with_camera(mut self, camera: Box<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_speaker(mut self, speaker: Box<dyn AlertPlayer>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn build(self) -> HardwareRegistry {
        let world = self.world;
        let mut registry = HardwareRegistry::new();
        registry.register_wheels(
            self.wheels
                .unwrap_or_else(|| Box::new(SimWheels::new(world.clone()))),
        );
        registry.register_range(
            self.range
                .unwrap_or_else(|| Box::new(SimRangeSensor::new(world.clone()))),
        );
        registry.register_proximity(
            self.proximity
                .unwrap_or_else(|| Box::new(SimProximity::new(world.clone()))),
        );
        registry.register_camera(
            self.camera
                .unwrap_or_else(|| Box::new(SimCamera::new(world.clone()))),
        );
        registry.register_speaker(
            self.speaker
                .unwrap_or_else(|| Box::new(SimAlertPlayer::new(world.clone()))),
        );
        registry
    }
}
