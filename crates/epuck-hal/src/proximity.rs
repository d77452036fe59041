//! Infrared proximity ring.
//!
//! The eight sensors report a raw reflected-light delta that grows as a
//! surface gets closer.  [`CalibratedProximity`] turns deltas into
//! millimetres with a straight line fitted through two front readings taken
//! at known distances.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use epuck_types::ExplorerError;

/// Sensors on the ring, front right first, clockwise.
pub const PROXIMITY_SENSORS: usize = 8;

pub trait ProximitySensor: Send + Sync {
    fn id(&self) -> &str;

    /// Raw deltas of every sensor.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] when the ring does not answer.
    fn read_deltas(&mut self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError>;
}

pub type SharedProximity = Arc<Mutex<CalibratedProximity>>;

/// `distance = (delta + bias) / divider`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityFit {
    pub divider: f64,
    pub bias: f64,
}

impl ProximityFit {
    /// Line through two `(distance, delta)` points.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] when the delta does not change
    /// with the distance.
    pub fn through(component: &str, first: (f64, f64), second: (f64, f64)) -> Result<Self, ExplorerError> {
        let divider = (second.1 - first.1) / (second.0 - first.0);
        if !divider.is_finite() || divider.abs() < 1e-9 {
            return Err(ExplorerError::HardwareFault {
                component: component.to_string(),
                details: format!(
                    "flat response: delta {:.1} at {:.1} mm, {:.1} at {:.1} mm",
                    first.1, first.0, second.1, second.0
                ),
            });
        }
        Ok(Self {
            divider,
            bias: divider * first.0 - first.1,
        })
    }

    pub fn distance(&self, delta: f64) -> f64 {
        (delta + self.bias) / self.divider
    }
}

pub struct CalibratedProximity {
    inner: Box<dyn ProximitySensor>,
    fit: Option<ProximityFit>,
    first_point: Option<(f64, f64)>,
}

impl CalibratedProximity {
    pub fn new(inner: Box<dyn ProximitySensor>) -> Self {
        Self {
            inner,
            fit: None,
            first_point: None,
        }
    }

    pub fn shared(self) -> SharedProximity {
        Arc::new(Mutex::new(self))
    }

    pub fn fit(&self) -> Option<ProximityFit> {
        self.fit
    }

    /// Forget a half-recorded pair.
    pub fn reset_pair(&mut self) {
        self.first_point = None;
    }

    /// Read the front sensor while the surface ahead is `distance` away.
    ///
    /// Calls come in pairs: the first keeps the point, the second fits the
    /// line and returns it.  A failed fit keeps the previous one and starts
    /// a new pair.
    pub fn record_point(&mut self, distance: f64) -> Result<Option<ProximityFit>, ExplorerError> {
        let delta = self.inner.read_deltas()?[0];
        let Some(first) = self.first_point.take() else {
            self.first_point = Some((distance, delta));
            return Ok(None);
        };

        let fit = ProximityFit::through(self.inner.id(), first, (distance, delta))?;
        info!(sensor = self.inner.id(), divider = fit.divider, bias = fit.bias, "proximity ring calibrated");
        self.fit = Some(fit);
        Ok(Some(fit))
    }

    /// Distance seen by every sensor (millimetres).
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::NotCalibrated`] before the first fit.
    pub fn read_distances(&mut self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError> {
        let fit = self.fit.ok_or(ExplorerError::NotCalibrated)?;
        Ok(self.inner.read_deltas()?.map(|delta| fit.distance(delta)))
    }
}
