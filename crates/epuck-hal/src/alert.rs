//! `AlertPlayer` trait for the melody speaker.

use std::sync::{Arc, Mutex};

use epuck_types::{ExplorerError, Melody};

pub type SharedAlerts = Arc<Mutex<Box<dyn AlertPlayer>>>;

/// A speaker able to play the fixed melody set.
pub trait AlertPlayer: Send + Sync {
    /// Stable identifier, e.g. `"speaker"`.
    fn id(&self) -> &str;

    /// Start playing `melody`; returns before playback ends.
    fn play_melody(&mut self, melody: Melody) -> Result<(), ExplorerError>;

    /// Block until the current melody has finished.
    fn wait_for_melody_end(&mut self) -> Result<(), ExplorerError>;
}
