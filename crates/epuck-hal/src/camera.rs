//! `Camera` trait and frame type for the front camera.

use std::sync::{Arc, Mutex};

use epuck_types::ExplorerError;

/// A camera shared between activities; captures block.
pub type SharedCamera = Arc<Mutex<Box<dyn Camera>>>;

/// A raw greyscale frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// One byte per pixel, row-major.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Mean pixel intensity in `[0, 255]`; `0.0` for an empty frame.
    pub fn mean_brightness(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f64).sum::<f64>() / self.data.len() as f64
    }
}

/// A camera or image-capture device.
///
/// Captures are slow and block the calling thread.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"front_camera"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::HardwareFault`] if the frame cannot be
    /// captured.
    fn capture(&mut self) -> Result<CameraFrame, ExplorerError>;
}
