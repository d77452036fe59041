//! Object tracker.
//!
//! Keeps the ordered list of objects seen inside the calibrated arena.
//! Readings close to a wall are the wall itself; the rest are merged with
//! known objects when they fall inside the merge radius and appended
//! otherwise.
//!
//! The tracker is shared between activities behind an
//! `Arc<tokio::sync::Mutex<ObjectTracker>>`; it holds no locks itself.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use epuck_types::{ExplorerError, Measurement, Point, WallBoundary};

use crate::sensor::SensorGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Points closer than this to a wall belong to the wall (millimetres).
    pub wall_tolerance: f64,
    /// Points closer than this to a known object are that object.
    pub merge_threshold: f64,
    /// A single `track` call stops once this many new, or this many known,
    /// objects were found.
    pub per_call_limit: usize,
    /// Hard bound on the object list.
    pub capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            wall_tolerance: 40.0,
            merge_threshold: 60.0,
            per_call_limit: 3,
            capacity: 64,
        }
    }
}

/// Outcome of one [`ObjectTracker::track`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Objects appended by this call; each still needs a photograph.
    pub new: Vec<Point>,
    /// Already-listed objects seen again.
    pub known: Vec<Point>,
    pub wall_hits: usize,
    pub out_of_range: usize,
}

impl TrackReport {
    fn limit_reached(&self, limit: usize) -> bool {
        self.new.len() >= limit || self.known.len() >= limit
    }
}

#[derive(Debug, Clone)]
pub struct ObjectTracker {
    objects: Vec<Point>,
    boundary: Option<WallBoundary>,
    sensor: SensorGeometry,
    config: TrackerConfig,
}

impl ObjectTracker {
    pub fn new(sensor: SensorGeometry, config: TrackerConfig) -> Self {
        Self {
            objects: Vec::with_capacity(config.capacity),
            boundary: None,
            sensor,
            config,
        }
    }

    pub fn objects(&self) -> &[Point] {
        &self.objects
    }

    pub fn boundary(&self) -> Option<WallBoundary> {
        self.boundary
    }

    pub fn set_boundary(&mut self, boundary: WallBoundary) {
        self.boundary = Some(boundary);
    }

    /// Forget every object and the boundary; a new discovery cycle starts.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.boundary = None;
    }

    /// Classify `samples` against the walls and the object list.
    ///
    /// Fails with [`ExplorerError::NotCalibrated`] before a boundary is set
    /// and with [`ExplorerError::CapacityExceeded`] when a new object does not
    /// fit; objects appended earlier in the same call are kept.
    pub fn track(&mut self, samples: &[Measurement]) -> Result<TrackReport, ExplorerError> {
        let boundary = self.boundary.ok_or(ExplorerError::NotCalibrated)?;
        let merge_sq = self.config.merge_threshold * self.config.merge_threshold;
        let mut report = TrackReport::default();
        let mut touched: Vec<usize> = Vec::new();

        for m in samples {
            if report.limit_reached(self.config.per_call_limit) {
                break;
            }
            if !self.sensor.in_range(m.range) {
                report.out_of_range += 1;
                continue;
            }

            let p = self.sensor.to_world(m);
            if !boundary.contains_with_margin(&p, self.config.wall_tolerance) {
                report.wall_hits += 1;
                continue;
            }

            match self.objects.iter().position(|o| o.distance_squared(&p) <= merge_sq) {
                Some(idx) if touched.contains(&idx) => {}
                Some(idx) => {
                    touched.push(idx);
                    report.known.push(self.objects[idx]);
                }
                None => {
                    if self.objects.len() >= self.config.capacity {
                        error!(capacity = self.config.capacity, x = p.x, y = p.y, "object list full");
                        return Err(ExplorerError::CapacityExceeded {
                            what: "object list".to_string(),
                            limit: self.config.capacity,
                        });
                    }
                    touched.push(self.objects.len());
                    self.objects.push(p);
                    report.new.push(p);
                    debug!(x = p.x, y = p.y, total = self.objects.len(), "new object");
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epuck_types::Pose;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn arena() -> WallBoundary {
        WallBoundary {
            x_min: 0.0,
            x_max: 600.0,
            y_min: 0.0,
            y_max: 400.0,
        }
    }

    fn sensor() -> SensorGeometry {
        SensorGeometry {
            offset: 0.0,
            ..Default::default()
        }
    }

    fn tracker(config: TrackerConfig) -> ObjectTracker {
        let mut t = ObjectTracker::new(sensor(), config);
        t.set_boundary(arena());
        t
    }

    fn sample(x: f64, y: f64, theta: f64, range: f64) -> Measurement {
        Measurement {
            pose: Pose::new(x, y, theta),
            range,
        }
    }

    #[test]
    fn requires_boundary() {
        let mut t = ObjectTracker::new(sensor(), TrackerConfig::default());
        assert_eq!(
            t.track(&[sample(100.0, 100.0, 0.0, 50.0)]),
            Err(ExplorerError::NotCalibrated)
        );
    }

    #[test]
    fn same_point_from_two_poses_is_counted_once() {
        let mut t = tracker(TrackerConfig::default());
        // Object at (300, 200): seen from the west and from the south.
        let first = t.track(&[sample(200.0, 200.0, 0.0, 100.0)]).unwrap();
        let second = t.track(&[sample(300.0, 50.0, FRAC_PI_2, 150.0)]).unwrap();

        assert_eq!(first.new.len(), 1);
        assert!(second.new.is_empty());
        assert_eq!(second.known.len(), 1);
        assert_eq!(t.objects().len(), 1);
    }

    #[test]
    fn wall_proximate_and_outside_points_are_discarded() {
        let mut t = tracker(TrackerConfig::default());
        let report = t
            .track(&[
                // Hits the east wall.
                sample(500.0, 200.0, 0.0, 95.0),
                // Beyond the north wall.
                sample(300.0, 300.0, FRAC_PI_2, 200.0),
                // Out of sensor range.
                sample(300.0, 200.0, PI, 8190.0),
            ])
            .unwrap();
        assert_eq!(report.wall_hits, 2);
        assert_eq!(report.out_of_range, 1);
        assert!(t.objects().is_empty());
    }

    #[test]
    fn stops_after_per_call_limit() {
        let mut t = tracker(TrackerConfig::default());
        let samples: Vec<Measurement> = (0..6)
            .map(|i| sample(100.0 + i as f64 * 80.0, 100.0, FRAC_PI_2, 100.0))
            .collect();
        let report = t.track(&samples).unwrap();
        assert_eq!(report.new.len(), 3);
        assert_eq!(t.objects().len(), 3);
    }

    /// Objects along y = 200, one per 80 mm from x = 100.
    fn row(xs: &[f64]) -> Vec<Measurement> {
        xs.iter().map(|&x| sample(x, 100.0, FRAC_PI_2, 100.0)).collect()
    }

    #[test]
    fn known_objects_do_not_use_up_the_new_limit() {
        let mut t = tracker(TrackerConfig::default());
        t.track(&row(&[100.0])).unwrap();

        let report = t.track(&row(&[100.0, 180.0, 260.0, 340.0, 420.0])).unwrap();
        assert_eq!(report.known.len(), 1);
        assert_eq!(report.new.len(), 3);
        assert_eq!(t.objects().len(), 4);
    }

    #[test]
    fn stops_after_per_call_limit_of_known_objects() {
        let mut t = tracker(TrackerConfig::default());
        t.track(&row(&[100.0, 180.0, 260.0])).unwrap();

        let report = t.track(&row(&[100.0, 180.0, 260.0, 420.0])).unwrap();
        assert_eq!(report.known.len(), 3);
        assert!(report.new.is_empty());
        assert_eq!(t.objects().len(), 3);
    }

    #[test]
    fn repeated_hits_on_one_object_count_once() {
        let mut t = tracker(TrackerConfig::default());
        let samples: Vec<Measurement> = (0..5)
            .map(|i| sample(200.0, 200.0, i as f64 * 0.01, 100.0))
            .collect();
        let report = t.track(&samples).unwrap();
        assert_eq!(report.new.len(), 1);
        assert!(report.known.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut t = tracker(TrackerConfig {
            capacity: 1,
            ..Default::default()
        });
        t.track(&[sample(100.0, 100.0, 0.0, 100.0)]).unwrap();
        let err = t.track(&[sample(100.0, 300.0, 0.0, 300.0)]).unwrap_err();
        assert!(matches!(err, ExplorerError::CapacityExceeded { limit: 1, .. }));
        assert_eq!(t.objects().len(), 1);
    }

    #[test]
    fn reset_clears_objects_and_boundary() {
        let mut t = tracker(TrackerConfig::default());
        t.track(&[sample(100.0, 100.0, 0.0, 100.0)]).unwrap();
        t.reset();
        assert!(t.objects().is_empty());
        assert!(t.boundary().is_none());
    }
}
