//! Front time-of-flight range sensor.

use std::sync::{Arc, Mutex};

use tracing::info;

use epuck_types::ExplorerError;

/// A distance sensor returning millimetres from its face to the first
/// obstacle.  Reads block until a measurement is available.
pub trait RangeSensor: Send + Sync {
    /// Stable identifier, e.g. `"front_tof"`.
    fn id(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] when the sensor does not answer.
    fn read_range(&mut self) -> Result<f64, ExplorerError>;
}

/// The front sensor as shared by scans and the obstacle watch.  Reads block,
/// so holders lock it from blocking threads only.
pub type SharedRange = Arc<Mutex<CalibratedRange>>;

/// Wraps a raw sensor and subtracts a one-time additive offset from every
/// reading.
pub struct CalibratedRange {
    inner: Box<dyn RangeSensor>,
    offset: f64,
}

impl CalibratedRange {
    pub fn new(inner: Box<dyn RangeSensor>) -> Self {
        Self { inner, offset: 0.0 }
    }

    pub fn shared(self) -> SharedRange {
        Arc::new(Mutex::new(self))
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Take one raw reading while facing a target `known_distance` away and
    /// keep the difference as the offset.  Returns the new offset.
    pub fn calibrate(&mut self, known_distance: f64) -> Result<f64, ExplorerError> {
        let raw = self.inner.read_range()?;
        self.offset = raw - known_distance;
        info!(sensor = self.inner.id(), raw, known_distance, offset = self.offset, "range sensor calibrated");
        Ok(self.offset)
    }
}

impl RangeSensor for CalibratedRange {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn read_range(&mut self) -> Result<f64, ExplorerError> {
        Ok(self.inner.read_range()? - self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRange(f64);

    impl RangeSensor for FixedRange {
        fn id(&self) -> &str {
            "fixed"
        }

        fn read_range(&mut self) -> Result<f64, ExplorerError> {
            Ok(self.0)
        }
    }

    struct DeadSensor;

    impl RangeSensor for DeadSensor {
        fn id(&self) -> &str {
            "dead"
        }

        fn read_range(&mut self) -> Result<f64, ExplorerError> {
            Err(ExplorerError::HardwareFault {
                component: "dead".to_string(),
                details: "no answer".to_string(),
            })
        }
    }

    #[test]
    fn uncalibrated_reading_passes_through() {
        let mut s = CalibratedRange::new(Box::new(FixedRange(120.0)));
        assert_eq!(s.read_range().unwrap(), 120.0);
    }

    #[test]
    fn calibration_removes_bias() {
        let mut s = CalibratedRange::new(Box::new(FixedRange(74.0)));
        assert_eq!(s.calibrate(66.0).unwrap(), 8.0);
        assert_eq!(s.read_range().unwrap(), 66.0);
        assert_eq!(s.id(), "fixed");
    }

    #[test]
    fn failed_calibration_keeps_previous_offset() {
        let mut s = CalibratedRange::new(Box::new(DeadSensor));
        assert!(s.calibrate(66.0).is_err());
        assert_eq!(s.offset(), 0.0);
    }
}
