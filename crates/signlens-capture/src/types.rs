//! Camera backend traits.

use async_trait::async_trait;

use signlens_types::CaptureError;

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera, pointing away from the user.
    Environment,
    /// Whatever the device has.
    Any,
}

/// One uncompressed RGB8 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8 pixels, `width * height * 3` bytes.
    pub rgb: Vec<u8>,
}

impl RawFrame {
    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        let rgb = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self { width, height, rgb }
    }
}

/// A running camera stream.
pub trait LiveStream: Send {
    /// Read the frame currently shown by the stream.
    fn current_frame(&mut self) -> Result<RawFrame, CaptureError>;
    /// Stop the stream and release the device.
    fn stop(&mut self);
}

/// Source of camera streams (platform camera API, still file, test fake).
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Backend identifier.
    fn id(&self) -> &str;
    /// Open a stream on a camera with the given facing.
    ///
    /// Returns `DeviceUnavailable` when no camera matches `facing`.
    async fn open(&self, facing: Facing) -> Result<Box<dyn LiveStream>, CaptureError>;
}
