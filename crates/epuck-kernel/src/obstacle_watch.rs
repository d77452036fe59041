//! [`ObstacleWatch`] – polls the front range sensor and raises the obstacle
//! gate while something is closer than the stop distance.
//!
//! The watch task ticks on a [`tokio::time::interval`], reads the shared
//! sensor from a blocking thread, and publishes the result on a `watch`
//! channel.  Movement routines race their translation segments against
//! [`ObstacleGate::wait_raised`] to stop early.  Shutdown is explicit through
//! [`ObstacleWatch::shutdown`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use epuck_hal::range::{RangeSensor, SharedRange};
use epuck_types::ExplorerError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub enabled: bool,
    /// Readings below this raise the gate (millimetres).
    pub stop_distance: f64,
    pub poll_interval_ms: u64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_distance: 30.0,
            poll_interval_ms: 50,
        }
    }
}

/// Read the shared sensor on a blocking thread.
pub async fn sample_range(range: SharedRange) -> Result<f64, ExplorerError> {
    tokio::task::spawn_blocking(move || {
        let mut sensor = range.lock().map_err(|e| ExplorerError::HardwareFault {
            component: "front_tof".to_string(),
            details: e.to_string(),
        })?;
        sensor.read_range()
    })
    .await
    .map_err(|e| ExplorerError::HardwareFault {
        component: "front_tof".to_string(),
        details: e.to_string(),
    })?
}

/// Read side of the obstacle flag.  Cloneable.
#[derive(Clone)]
pub struct ObstacleGate {
    rx: watch::Receiver<bool>,
}

impl ObstacleGate {
    /// A gate that never rises.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// A gate driven by some other obstacle source.
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once an obstacle is reported; immediately if one already is.
    /// Pends forever once the watch has shut down.
    pub async fn wait_raised(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct ObstacleWatch {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ObstacleWatch {
    pub fn spawn(range: SharedRange, config: ObstacleConfig) -> (ObstacleWatch, ObstacleGate) {
        let (flag_tx, flag_rx) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(range, config, flag_tx, shutdown_rx));
        (ObstacleWatch { shutdown, task }, ObstacleGate { rx: flag_rx })
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "obstacle watch ended abnormally");
        }
    }
}

async fn run(
    range: SharedRange,
    config: ObstacleConfig,
    flag: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(stop_distance = config.stop_distance, "obstacle watch started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match sample_range(range.clone()).await {
                    Ok(distance) => {
                        let raised = distance < config.stop_distance;
                        if flag.send_if_modified(|current| std::mem::replace(current, raised) != raised) {
                            debug!(distance, raised, "obstacle flag changed");
                        }
                    }
                    Err(e) => warn!(error = %e, "obstacle watch read failed"),
                }
            }
        }
    }

    flag.send_replace(false);
    info!("obstacle watch stopped");
}
