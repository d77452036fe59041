//! [`ActionDispatcher`] – one activity at a time.
//!
//! ```text
//!            request(Discover)   ┌─────────────┐
//!          ┌───────────────────▶ │ Discovering │ ──┐
//!          │ request(Explore)    ├─────────────┤   │
//!   ┌──────┴─┐ ────────────────▶ │  Exploring  │ ──┤ activity finished
//!   │  Idle  │ request(Calibrate)├─────────────┤   │ (history updated,
//!   └──────▲─┘ ────────────────▶ │ Calibrating │ ──┤  work-done signalled)
//!          │ request(Report)     ├─────────────┤   │
//!          │ ──────────────────▶ │ Announcing  │ ──┤
//!          │                     └─────────────┘   │
//!          └───────────────────────────────────────┘
//! ```
//!
//! A request made while an activity runs, or an exploration requested before
//! a successful discovery, is refused with [`ExplorerError::IllegalAction`]
//! and the alert melody; state and history stay as they were.
//!
//! Each activity runs on a task of its own under a supervisor.  The
//! supervisor records the outcome even when the activity panics, and
//! announces hardware faults on the alerts topic.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use epuck_types::{ExplorerError, Melody};

use crate::explorer::Explorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    Discover,
    Explore,
    Calibrate,
    Report,
}

impl Activity {
    fn state(self) -> DispatchState {
        match self {
            Activity::Discover => DispatchState::Discovering,
            Activity::Explore => DispatchState::Exploring,
            Activity::Calibrate => DispatchState::Calibrating,
            Activity::Report => DispatchState::Announcing,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchState {
    Idle,
    Discovering,
    Exploring,
    Calibrating,
    Announcing,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What has been achieved so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// The arena frame is calibrated.
    pub discovered: bool,
    pub explored: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchStatus {
    pub state: DispatchState,
    pub history: History,
    /// Activities finished since start.
    pub completed: u64,
    /// Error of the most recent activity, if it failed.
    pub last_error: Option<ExplorerError>,
}

impl DispatchStatus {
    fn admit(&self, activity: Activity) -> Result<(), ExplorerError> {
        if self.state != DispatchState::Idle {
            return Err(ExplorerError::IllegalAction {
                state: self.state.to_string(),
                requested: activity.to_string(),
            });
        }
        if activity == Activity::Explore && !self.history.discovered {
            return Err(ExplorerError::IllegalAction {
                state: "undiscovered".to_string(),
                requested: activity.to_string(),
            });
        }
        Ok(())
    }

    /// Record how `activity` ended.  For a discovery `Ok` carries whether the
    /// walls were found.
    fn finish(&mut self, activity: Activity, outcome: &Result<bool, ExplorerError>) {
        match (activity, outcome) {
            // A discovery always clears the previous map first.
            (Activity::Discover, Ok(located)) => self.history.discovered = *located,
            (Activity::Discover, Err(_)) => self.history.discovered = false,
            (Activity::Explore, Ok(_)) => self.history.explored = true,
            _ => {}
        }
        self.last_error = outcome.as_ref().err().cloned();
        self.state = DispatchState::Idle;
        self.completed += 1;
    }
}

impl Default for DispatchStatus {
    fn default() -> Self {
        Self {
            state: DispatchState::Idle,
            history: History::default(),
            completed: 0,
            last_error: None,
        }
    }
}

/// Cheap to clone; clones share the state.
#[derive(Clone)]
pub struct ActionDispatcher {
    explorer: Explorer,
    status: Arc<watch::Sender<DispatchStatus>>,
}

impl ActionDispatcher {
    pub fn new(explorer: Explorer) -> Self {
        let (status, _) = watch::channel(DispatchStatus::default());
        Self {
            explorer,
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> DispatchStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchStatus> {
        self.status.subscribe()
    }

    /// Start `activity` on its own task, or refuse it.
    ///
    /// Returns as soon as the activity is started; use
    /// [`wait_until_end_of_work`][Self::wait_until_end_of_work] to wait for it.
    pub async fn request(&self, activity: Activity) -> Result<(), ExplorerError> {
        let mut refusal = None;
        self.status.send_if_modified(|status| match status.admit(activity) {
            Ok(()) => {
                status.state = activity.state();
                true
            }
            Err(e) => {
                refusal = Some(e);
                false
            }
        });

        if let Some(e) = refusal {
            warn!(%activity, error = %e, "request refused");
            if let Err(alert) = self.explorer.alert(Melody::IllegalAction).await {
                warn!(error = %alert, "alert melody failed");
            }
            return Err(e);
        }

        info!(%activity, "activity started");
        let work = {
            let explorer = self.explorer.clone();
            async move { run(&explorer, activity).await }
        };
        tokio::spawn(supervise(self.status.clone(), self.explorer.clone(), activity, work));
        Ok(())
    }

    /// Resolve once no activity is running.
    pub async fn wait_until_end_of_work(&self, timeout: Duration) -> Result<DispatchStatus, ExplorerError> {
        let mut rx = self.status.subscribe();
        let status = tokio::time::timeout(timeout, rx.wait_for(|s| s.state == DispatchState::Idle))
            .await
            .map_err(|_| ExplorerError::Timeout {
                operation: "end of work".to_string(),
                after_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| ExplorerError::Channel(e.to_string()))?
            .clone();
        Ok(status)
    }
}

/// Run `work` on its own task, then put the dispatcher back to idle with the
/// outcome.  A panicking or cancelled task counts as
/// [`ExplorerError::ActivityAborted`].
async fn supervise<F>(status: Arc<watch::Sender<DispatchStatus>>, explorer: Explorer, activity: Activity, work: F)
where
    F: Future<Output = Result<bool, ExplorerError>> + Send + 'static,
{
    let outcome = tokio::spawn(work)
        .await
        .unwrap_or_else(|e| {
            Err(ExplorerError::ActivityAborted {
                activity: activity.to_string(),
                details: e.to_string(),
            })
        });

    match &outcome {
        Ok(_) => info!(%activity, "activity finished"),
        Err(e) => error!(%activity, error = %e, "activity failed"),
    }
    if let Err(ExplorerError::HardwareFault { component, details }) = &outcome {
        explorer.signal_fault(component, details).await;
    }
    status.send_modify(|s| s.finish(activity, &outcome));
}

async fn run(explorer: &Explorer, activity: Activity) -> Result<bool, ExplorerError> {
    match activity {
        Activity::Discover => explorer.discover().await,
        Activity::Explore => explorer.explore().await.map(|_| true),
        Activity::Calibrate => explorer.calibrate().await.map(|_| true),
        Activity::Report => explorer.report().await.map(|_| true),
    }
}
