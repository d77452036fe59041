//! [`Explorer`] – the activities the dispatcher runs.
//!
//! | Activity | What it does |
//! |---|---|
//! | [`discover`][Explorer::discover] | forget the map, reset the pose, scan a full turn, calibrate the frame on the walls |
//! | [`explore`][Explorer::explore] | visit the arena centre and quadrant centres, scan at each, photograph new objects |
//! | [`calibrate`][Explorer::calibrate] | derive the front sensor offset from the reference wall distance, then fit the proximity ring on two distances |
//! | [`report`][Explorer::report] | publish the map and play the completion melody |
//!
//! The explorer is cheap to clone; clones share the motors, the sensors and
//! the object list.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use epuck_hal::alert::SharedAlerts;
use epuck_hal::proximity::{PROXIMITY_SENSORS, ProximityFit, SharedProximity};
use epuck_hal::range::SharedRange;
use epuck_hal::registry::{FRONT_RANGE_ID, PROXIMITY_ID, SPEAKER_ID};
use epuck_kernel::obstacle_watch::sample_range;
use epuck_middleware::{EventBus, Topic};
use epuck_perception::sensor::SensorGeometry;
use epuck_perception::tracker::ObjectTracker;
use epuck_perception::walls::{WallsConfig, locate_walls};
use epuck_types::{EventPayload, ExplorerError, Measurement, Melody, Point, Verbosity, WallBoundary};

use crate::planner::{Arrival, DisplacementPlanner, Photo};
use crate::system::SystemConfig;

const SOURCE: &str = "epuck-runtime::explorer";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Distance from the sensor face to the wall the robot faces while the
    /// front sensor is calibrated (millimetres).
    pub reference_distance: f64,
    /// How far the robot backs away from the reference wall between the two
    /// proximity calibration points (millimetres).
    pub ir_travel: f64,
    /// Pause before the second proximity point is read.
    pub ir_settle_ms: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            reference_distance: 66.0,
            ir_travel: 40.0,
            ir_settle_ms: 500,
        }
    }
}

/// Outcome of [`Explorer::calibrate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    /// Subtracted from every front range reading.
    pub range_offset: f64,
    pub proximity: ProximityFit,
}

#[derive(Clone)]
pub struct Explorer {
    planner: DisplacementPlanner,
    range: SharedRange,
    proximity: SharedProximity,
    alerts: SharedAlerts,
    tracker: Arc<Mutex<ObjectTracker>>,
    bus: EventBus,
    sensor: SensorGeometry,
    walls: WallsConfig,
    config: ExplorerConfig,
}

impl Explorer {
    pub fn new(
        planner: DisplacementPlanner,
        range: SharedRange,
        proximity: SharedProximity,
        alerts: SharedAlerts,
        bus: EventBus,
        settings: &SystemConfig,
    ) -> Self {
        Self {
            planner,
            range,
            proximity,
            alerts,
            tracker: Arc::new(Mutex::new(ObjectTracker::new(settings.sensor, settings.tracker))),
            bus,
            sensor: settings.sensor,
            walls: settings.walls,
            config: settings.explorer,
        }
    }

    pub fn planner(&self) -> &DisplacementPlanner {
        &self.planner
    }

    pub async fn objects(&self) -> Vec<Point> {
        self.tracker.lock().await.objects().to_vec()
    }

    pub async fn boundary(&self) -> Option<WallBoundary> {
        self.tracker.lock().await.boundary()
    }

    /// Sample the front sensor, then turn one increment, until a full turn
    /// is covered.
    pub async fn scan(&self) -> Result<Vec<Measurement>, ExplorerError> {
        let steps = self.walls.scan_increments.max(1);
        let step = TAU / steps as f64;
        let mut samples = Vec::with_capacity(steps);

        for _ in 0..steps {
            let pose = self.planner.motors().actual_position().await?;
            let range = sample_range(self.range.clone()).await?;
            samples.push(Measurement { pose, range });
            self.planner.rotate_by(step).await?;
        }

        debug!(samples = samples.len(), "scan complete");
        Ok(samples)
    }

    /// Locate the walls in `samples` and move the pose into the arena frame.
    ///
    /// Returns `false`, leaving the pose and the boundary untouched, when the
    /// walls cannot be located.
    pub async fn compute_wall_location(&self, samples: &[Measurement]) -> Result<bool, ExplorerError> {
        let Some(calibration) = locate_walls(samples, &self.sensor, &self.walls) else {
            return Ok(false);
        };

        let pose = self.planner.motors().apply_frame(calibration.transform).await?;
        self.tracker.lock().await.set_boundary(calibration.boundary);
        info!(
            x = pose.x,
            y = pose.y,
            theta = pose.theta,
            width = calibration.boundary.width(),
            height = calibration.boundary.height(),
            "frame calibrated on the arena walls"
        );
        Ok(true)
    }

    pub async fn discover(&self) -> Result<bool, ExplorerError> {
        self.tracker.lock().await.reset();
        self.planner.motors().reset_coordinates().await?;

        let samples = self.scan().await?;
        let located = self.compute_wall_location(&samples).await?;
        let boundary = self.boundary().await;

        self.bus.publish(
            Topic::Mapping,
            SOURCE,
            EventPayload::CalibrationCompleted {
                success: located,
                boundary,
            },
        );
        if !located {
            warn!(samples = samples.len(), "arena walls not found");
            self.bus
                .write_message(SOURCE, "arena walls not found, discovery failed", Verbosity::Important);
        }
        Ok(located)
    }

    /// Visit the arena centre and the four quadrant centres.  New objects
    /// seen from a waypoint are photographed before moving on.
    pub async fn explore(&self) -> Result<Vec<Photo>, ExplorerError> {
        let boundary = self.boundary().await.ok_or(ExplorerError::NotCalibrated)?;
        let mut photos = Vec::new();

        for (idx, waypoint) in arena_waypoints(&boundary).into_iter().enumerate() {
            if self.planner.go_to(waypoint).await? == Arrival::Blocked {
                warn!(waypoint = idx, "waypoint not reached, scanning from here");
            }

            let samples = self.scan().await?;
            let report = self.tracker.lock().await.track(&samples)?;
            debug!(
                waypoint = idx,
                new = report.new.len(),
                known = report.known.len(),
                wall_hits = report.wall_hits,
                "waypoint scanned"
            );

            for object in report.new {
                self.bus
                    .publish(Topic::Mapping, SOURCE, EventPayload::ObjectDiscovered(object));
                photos.push(self.planner.visit_and_photograph(object).await?);
                self.planner.go_to(waypoint).await?;
            }
        }

        let objects = self.tracker.lock().await.objects().len();
        info!(objects, photos = photos.len(), "exploration finished");
        Ok(photos)
    }

    /// Calibrate the sensors while facing a wall at the reference distance.
    ///
    /// The front sensor offset comes first.  The proximity ring is then fitted
    /// on the front readings taken there and `ir_travel` further back, after
    /// which the robot returns to the wall.
    pub async fn calibrate(&self) -> Result<SensorCalibration, ExplorerError> {
        let range = self.range.clone();
        let known = self.config.reference_distance;
        let range_offset = tokio::task::spawn_blocking(move || {
            range
                .lock()
                .map_err(|e| fault(FRONT_RANGE_ID, e))?
                .calibrate(known)
        })
        .await
        .map_err(|e| fault(FRONT_RANGE_ID, e))??;
        self.bus.write_message(
            SOURCE,
            format!("front sensor offset set to {range_offset:.1} mm"),
            Verbosity::Info,
        );

        self.proximity_point(true).await?;
        self.planner.translate_by(-self.config.ir_travel).await?;
        tokio::time::sleep(Duration::from_millis(self.config.ir_settle_ms)).await;
        let fit = self.proximity_point(false).await;
        if self.planner.translate_by(self.config.ir_travel).await? == Arrival::Blocked {
            warn!("return to the reference wall cut short");
        }
        let proximity = fit?.ok_or_else(|| fault(PROXIMITY_ID, "calibration pair incomplete"))?;

        self.bus.write_message(
            SOURCE,
            format!(
                "proximity ring calibrated: divider {:.2}, bias {:.1}",
                proximity.divider, proximity.bias
            ),
            Verbosity::Info,
        );
        Ok(SensorCalibration {
            range_offset,
            proximity,
        })
    }

    /// Pair the front range with the front proximity delta.  `first` drops
    /// any half-recorded pair.
    async fn proximity_point(&self, first: bool) -> Result<Option<ProximityFit>, ExplorerError> {
        let distance = sample_range(self.range.clone()).await?;
        let ring = self.proximity.clone();
        tokio::task::spawn_blocking(move || {
            let mut ring = ring.lock().map_err(|e| fault(PROXIMITY_ID, e))?;
            if first {
                ring.reset_pair();
            }
            ring.record_point(distance)
        })
        .await
        .map_err(|e| fault(PROXIMITY_ID, e))?
    }

    /// Distances seen by the proximity ring (millimetres).
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::NotCalibrated`] before the first calibration.
    pub async fn proximity_distances(&self) -> Result<[f64; PROXIMITY_SENSORS], ExplorerError> {
        let ring = self.proximity.clone();
        tokio::task::spawn_blocking(move || {
            ring.lock()
                .map_err(|e| fault(PROXIMITY_ID, e))?
                .read_distances()
        })
        .await
        .map_err(|e| fault(PROXIMITY_ID, e))?
    }

    /// Send the map and announce the end of work.
    pub async fn report(&self) -> Result<(), ExplorerError> {
        let (boundary, objects) = {
            let tracker = self.tracker.lock().await;
            (tracker.boundary(), tracker.objects().to_vec())
        };
        let count = objects.len();

        self.bus
            .publish(Topic::Mapping, SOURCE, EventPayload::MapReport { boundary, objects });
        self.bus
            .write_message(SOURCE, format!("map sent with {count} objects"), Verbosity::Important);
        self.alert(Melody::WorkDone).await
    }

    /// Play `melody` to the end.
    pub async fn alert(&self, melody: Melody) -> Result<(), ExplorerError> {
        self.bus.publish(Topic::Alerts, SOURCE, EventPayload::Alert(melody));
        let alerts = self.alerts.clone();
        tokio::task::spawn_blocking(move || {
            let mut speaker = alerts.lock().map_err(|e| fault(SPEAKER_ID, e))?;
            speaker.play_melody(melody)?;
            speaker.wait_for_melody_end()
        })
        .await
        .map_err(|e| fault(SPEAKER_ID, e))?
    }

    /// Announce a failed device on the alerts topic and with the fault
    /// melody.
    pub async fn signal_fault(&self, component: &str, details: &str) {
        self.bus.publish(
            Topic::Alerts,
            SOURCE,
            EventPayload::HardwareFault {
                component: component.to_string(),
                message: details.to_string(),
            },
        );
        if let Err(e) = self.alert(Melody::Fault).await {
            warn!(error = %e, "fault melody failed");
        }
    }
}

fn fault(component: &str, e: impl std::fmt::Display) -> ExplorerError {
    ExplorerError::HardwareFault {
        component: component.to_string(),
        details: e.to_string(),
    }
}

/// Arena centre followed by the centres of the four quadrants.
pub fn arena_waypoints(boundary: &WallBoundary) -> Vec<Point> {
    let (w, h) = (boundary.width(), boundary.height());
    let at = |fx: f64, fy: f64| Point::new(boundary.x_min + fx * w, boundary.y_min + fy * h);
    vec![
        boundary.center(),
        at(0.25, 0.25),
        at(0.75, 0.25),
        at(0.25, 0.75),
        at(0.75, 0.75),
    ]
}
