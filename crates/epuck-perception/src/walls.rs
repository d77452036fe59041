//! Wall discovery and frame calibration.
//!
//! A full-turn scan sampled from one spot is split into monotonic runs of
//! range readings.  Seen from inside a convex arena the range falls towards
//! the foot of the perpendicular on each wall and peaks at every corner, so
//! each run is a candidate piece of one straight wall.  Runs are projected to
//! world points, fitted with a line, and the longest one is intersected with
//! the most perpendicular other run to find an arena corner.  That corner
//! becomes the origin of the calibrated frame and the reference wall its
//! x axis.
//!
//! # Example
//!
//! ```rust,no_run
//! use epuck_perception::sensor::SensorGeometry;
//! use epuck_perception::walls::{locate_walls, WallsConfig};
//! use epuck_types::Measurement;
//!
//! let samples: Vec<Measurement> = Vec::new(); // filled by a scan
//! match locate_walls(&samples, &SensorGeometry::default(), &WallsConfig::default()) {
//!     Some(cal) => println!("arena {} x {}", cal.boundary.width(), cal.boundary.height()),
//!     None => println!("not enough walls in sight"),
//! }
//! ```

use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_3;

use serde::{Deserialize, Serialize};
use tracing::debug;

use epuck_types::{Measurement, Point, WallBoundary};

use crate::frame::FrameTransform;
use crate::sensor::SensorGeometry;

/// Tunables for scanning and wall fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallsConfig {
    /// Number of equal rotation steps in a full-turn scan.
    pub scan_increments: usize,
    /// Shortest run accepted as a wall candidate.
    pub min_run_len: usize,
    /// Index distance between the two points of each finite difference.
    pub fit_stride: usize,
    /// Largest point-to-line distance tolerated in a fitted run (millimetres).
    pub max_fit_residual: f64,
    /// Smallest angle between the reference wall and its corner partner.
    pub min_corner_angle: f64,
    /// Candidates this close (radians) to the most perpendicular one count as
    /// equally perpendicular.
    pub perpendicular_tolerance: f64,
}

impl Default for WallsConfig {
    fn default() -> Self {
        Self {
            scan_increments: 36,
            min_run_len: 3,
            fit_stride: 2,
            max_fit_residual: 15.0,
            min_corner_angle: FRAC_PI_3,
            perpendicular_tolerance: 0.1,
        }
    }
}

/// A monotonic run of scan samples and their projected world points.
#[derive(Debug, Clone, PartialEq)]
pub struct WallRun {
    pub samples: Vec<Measurement>,
    pub points: Vec<Point>,
}

impl WallRun {
    fn new(samples: &[Measurement], sensor: &SensorGeometry) -> Self {
        Self {
            samples: samples.to_vec(),
            points: samples.iter().map(|m| sensor.to_world(m)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn extent(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => a.distance(b),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Flat,
    Rising,
    Falling,
}

fn trend(a: f64, b: f64) -> Trend {
    if b > a {
        Trend::Rising
    } else if b < a {
        Trend::Falling
    } else {
        Trend::Flat
    }
}

/// Split `samples` into maximal monotonic runs of range readings.
///
/// Equal neighbours extend the current run.  A local minimum is shared by the
/// falling and the rising run around it; a local maximum is a corner and
/// belongs to neither.  Runs shorter than `min_len` or holding any
/// out-of-range reading are dropped.
pub fn segment_runs(samples: &[Measurement], sensor: &SensorGeometry, min_len: usize) -> Vec<WallRun> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut bounds: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    let mut current = Trend::Flat;

    for i in 1..samples.len() {
        let step = trend(samples[i - 1].range, samples[i].range);
        match (current, step) {
            (_, Trend::Flat) => {}
            (Trend::Flat, s) => current = s,
            (c, s) if c == s => {}
            (Trend::Rising, _) => {
                bounds.push((start, i - 1));
                start = i;
                current = Trend::Flat;
            }
            (Trend::Falling, _) => {
                bounds.push((start, i));
                start = i - 1;
                current = Trend::Rising;
            }
        }
    }
    bounds.push((start, samples.len()));

    bounds
        .into_iter()
        .filter_map(|(from, to)| {
            let slice = samples.get(from..to)?;
            if slice.len() < min_len.max(1) {
                return None;
            }
            if slice.iter().any(|m| !sensor.in_range(m.range)) {
                debug!(from, to, "dropping run with out-of-range reading");
                return None;
            }
            Some(WallRun::new(slice, sensor))
        })
        .collect()
}

/// Which coordinate a [`WallLine`] is expressed as a function of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineForm {
    /// `y = slope · x + intercept`
    YOfX,
    /// `x = slope · y + intercept`, for walls closer to vertical.
    XOfY,
}

/// Fitted straight wall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallLine {
    pub form: LineForm,
    pub slope: f64,
    pub intercept: f64,
}

impl WallLine {
    /// Fit a line through `points` using the mean of finite-difference
    /// slopes between points `stride` apart; the line passes through the
    /// centroid.
    ///
    /// Returns `None` for fewer than two points or when every pair is
    /// degenerate.
    pub fn fit(points: &[Point], stride: usize) -> Option<WallLine> {
        let (first, last) = (points.first()?, points.last()?);
        if points.len() < 2 {
            return None;
        }

        let form = if (last.y - first.y).abs() > (last.x - first.x).abs() {
            LineForm::XOfY
        } else {
            LineForm::YOfX
        };
        let uv = |p: &Point| match form {
            LineForm::YOfX => (p.x, p.y),
            LineForm::XOfY => (p.y, p.x),
        };

        let stride = stride.clamp(1, points.len() - 1);
        let (mut sum, mut count) = (0.0, 0usize);
        for (a, b) in points.iter().zip(points.iter().skip(stride)) {
            let ((ua, va), (ub, vb)) = (uv(a), uv(b));
            let du = ub - ua;
            if du.abs() < 1e-9 {
                continue;
            }
            sum += (vb - va) / du;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let slope = sum / count as f64;

        let n = points.len() as f64;
        let (su, sv) = points.iter().map(uv).fold((0.0, 0.0), |(su, sv), (u, v)| (su + u, sv + v));
        let intercept = sv / n - slope * su / n;

        Some(WallLine {
            form,
            slope,
            intercept,
        })
    }

    /// Unit direction vector.
    pub fn direction(&self) -> Point {
        let norm = (1.0 + self.slope * self.slope).sqrt();
        match self.form {
            LineForm::YOfX => Point::new(1.0 / norm, self.slope / norm),
            LineForm::XOfY => Point::new(self.slope / norm, 1.0 / norm),
        }
    }

    /// A point on the line.
    pub fn anchor(&self) -> Point {
        match self.form {
            LineForm::YOfX => Point::new(0.0, self.intercept),
            LineForm::XOfY => Point::new(self.intercept, 0.0),
        }
    }

    /// Perpendicular distance from `p` to the line.
    pub fn distance_to(&self, p: &Point) -> f64 {
        let (d, a) = (self.direction(), self.anchor());
        cross(d, Point::new(p.x - a.x, p.y - a.y)).abs()
    }

    /// Acute angle between the two lines, in `[0, π/2]`.
    pub fn angle_to(&self, other: &WallLine) -> f64 {
        let (a, b) = (self.direction(), other.direction());
        cross(a, b).abs().atan2((a.x * b.x + a.y * b.y).abs())
    }

    pub fn intersect(&self, other: &WallLine) -> Option<Point> {
        let (d1, d2) = (self.direction(), other.direction());
        let denom = cross(d1, d2);
        if denom.abs() < 1e-9 {
            return None;
        }
        let (p1, p2) = (self.anchor(), other.anchor());
        let t = cross(Point::new(p2.x - p1.x, p2.y - p1.y), d2) / denom;
        Some(Point::new(p1.x + t * d1.x, p1.y + t * d1.y))
    }
}

fn cross(a: Point, b: Point) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Result of a successful calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallCalibration {
    /// Maps the dead-reckoned frame onto the arena frame.
    pub transform: FrameTransform,
    /// Arena rectangle in the arena frame.
    pub boundary: WallBoundary,
    /// The detected corner, in the dead-reckoned frame.
    pub corner: Point,
}

struct Candidate {
    angle: f64,
    corner: Point,
    transform: FrameTransform,
    robot_x: f64,
    len: usize,
}

/// Locate the arena walls in a full-turn scan.
///
/// Needs at least three fitted runs and a pair meeting at no less than
/// `min_corner_angle`; returns `None` otherwise.
pub fn locate_walls(
    samples: &[Measurement],
    sensor: &SensorGeometry,
    config: &WallsConfig,
) -> Option<WallCalibration> {
    let robot = samples.last()?.pose.position();

    let fitted: Vec<(WallRun, WallLine)> = segment_runs(samples, sensor, config.min_run_len)
        .into_iter()
        .filter_map(|run| {
            let line = WallLine::fit(&run.points, config.fit_stride)?;
            let worst = run.points.iter().map(|p| line.distance_to(p)).fold(0.0, f64::max);
            (worst <= config.max_fit_residual).then_some((run, line))
        })
        .collect();

    if fitted.len() < 3 {
        debug!(runs = fitted.len(), "too few wall runs for calibration");
        return None;
    }

    let reference_idx = (0..fitted.len()).max_by(|&a, &b| {
        let (ra, rb) = (&fitted[a].0, &fitted[b].0);
        ra.len()
            .cmp(&rb.len())
            .then(ra.extent().partial_cmp(&rb.extent()).unwrap_or(Ordering::Equal))
    })?;
    let reference = fitted[reference_idx].1;

    let candidates: Vec<Candidate> = fitted
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != reference_idx)
        .filter_map(|(_, (run, line))| {
            let angle = reference.angle_to(line);
            if angle < config.min_corner_angle {
                return None;
            }
            let corner = reference.intersect(line)?;
            let transform = frame_at_corner(&reference, corner, robot);
            Some(Candidate {
                angle,
                corner,
                transform,
                robot_x: transform.apply_point(robot).x,
                len: run.len(),
            })
        })
        .collect();

    let best_angle = candidates.iter().map(|c| c.angle).fold(0.0, f64::max);
    let Some(chosen) = candidates
        .iter()
        .filter(|c| c.angle >= best_angle - config.perpendicular_tolerance)
        .max_by(|a, b| {
            (a.robot_x > 0.0)
                .cmp(&(b.robot_x > 0.0))
                .then(a.len.cmp(&b.len))
        })
    else {
        debug!("no wall meets the reference at a usable angle");
        return None;
    };

    // Every in-range reading hit a wall or something inside the arena.
    let boundary = bounding_box(
        samples
            .iter()
            .filter(|m| sensor.in_range(m.range))
            .map(|m| chosen.transform.apply_point(sensor.to_world(m))),
    );

    debug!(
        corner_x = chosen.corner.x,
        corner_y = chosen.corner.y,
        angle = chosen.angle,
        width = boundary.width(),
        height = boundary.height(),
        "arena corner located"
    );

    Some(WallCalibration {
        transform: chosen.transform,
        boundary,
        corner: chosen.corner,
    })
}

/// Frame with its origin at `corner` and its x axis along `reference`,
/// oriented so that `robot` lies on the positive-y side.
fn frame_at_corner(reference: &WallLine, corner: Point, robot: Point) -> FrameTransform {
    let mut d = reference.direction();
    if cross(d, Point::new(robot.x - corner.x, robot.y - corner.y)) < 0.0 {
        d = Point::new(-d.x, -d.y);
    }
    FrameTransform::from_origin_and_axis(corner, d.y.atan2(d.x))
}

/// Smallest rectangle holding the origin and every point.
fn bounding_box(points: impl Iterator<Item = Point>) -> WallBoundary {
    points.fold(
        WallBoundary {
            x_min: 0.0,
            x_max: 0.0,
            y_min: 0.0,
            y_max: 0.0,
        },
        |b, p| WallBoundary {
            x_min: b.x_min.min(p.x),
            x_max: b.x_max.max(p.x),
            y_min: b.y_min.min(p.y),
            y_max: b.y_max.max(p.y),
        },
    )
}
