//! signlens-capture: single still-frame capture from a live camera stream.
//!
//! A [`CaptureSource`] opens the environment-facing camera (falling back to any
//! camera), hands out a single-owner [`StreamHandle`], and turns one frame of
//! that stream into a JPEG [`CapturedImage`]. Taking the frame releases the
//! stream; so does dropping the handle.

pub mod still;
pub mod types;

pub use still::StillImageCamera;
pub use types::{CameraBackend, Facing, LiveStream, RawFrame};

use std::sync::Arc;

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, info};

use signlens_types::{CaptureError, CapturedImage, ImageEncoding};

/// Exclusive handle on an open camera stream.
///
/// Not `Clone`: at most one owner holds the hardware at a time.
pub struct StreamHandle {
    stream: Option<Box<dyn LiveStream>>,
    facing: Facing,
}

impl StreamHandle {
    fn new(stream: Box<dyn LiveStream>, facing: Facing) -> Self {
        Self {
            stream: Some(stream),
            facing,
        }
    }

    /// Facing of the camera that was actually opened.
    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Whether the underlying stream is still held.
    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop and release the stream. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!(facing = ?self.facing, "Camera stream released");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("facing", &self.facing)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Opens camera streams and snapshots frames from them.
#[derive(Clone)]
pub struct CaptureSource {
    backend: Arc<dyn CameraBackend>,
    jpeg_quality: u8,
}

impl CaptureSource {
    /// Create a capture source. `jpeg_quality` is clamped to 1..=100.
    pub fn new(backend: Arc<dyn CameraBackend>, jpeg_quality: u8) -> Self {
        Self {
            backend,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Open the rear camera, or any camera if there is no rear one.
    ///
    /// Permission errors are returned as-is; nothing is retried.
    pub async fn open(&self) -> Result<StreamHandle, CaptureError> {
        match self.backend.open(Facing::Environment).await {
            Ok(stream) => {
                info!(backend = self.backend.id(), "Opened environment-facing camera");
                Ok(StreamHandle::new(stream, Facing::Environment))
            }
            Err(CaptureError::DeviceUnavailable(reason)) => {
                debug!(
                    backend = self.backend.id(),
                    "No environment-facing camera ({reason}), falling back to any"
                );
                let stream = self.backend.open(Facing::Any).await?;
                info!(backend = self.backend.id(), "Opened fallback camera");
                Ok(StreamHandle::new(stream, Facing::Any))
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot the current frame as JPEG and release the stream.
    ///
    /// The frame keeps the stream's native resolution. A handle whose stream
    /// was already released yields `DeviceUnavailable`.
    pub fn capture_frame(&self, handle: &mut StreamHandle) -> Result<CapturedImage, CaptureError> {
        let stream = handle.stream.as_mut().ok_or_else(|| {
            CaptureError::DeviceUnavailable("camera stream already released".into())
        })?;
        let frame = stream.current_frame()?;
        handle.release();

        let image = encode_jpeg(&frame, self.jpeg_quality)?;
        info!(
            width = image.width,
            height = image.height,
            bytes = image.len(),
            "Captured frame"
        );
        Ok(image)
    }

    /// Release a stream without capturing.
    pub fn close(&self, mut handle: StreamHandle) {
        handle.release();
    }
}

/// Encode an RGB8 frame as JPEG.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<CapturedImage, CaptureError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.width == 0 || frame.height == 0 || frame.rgb.len() != expected {
        return Err(CaptureError::Encoding(format!(
            "frame {}x{} has {} bytes, expected {expected}",
            frame.width,
            frame.height,
            frame.rgb.len()
        )));
    }

    let mut buf = Vec::with_capacity(expected / 8);
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            &frame.rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::Encoding(e.to_string()))?;

    Ok(CapturedImage::new(
        buf,
        ImageEncoding::Jpeg,
        frame.width,
        frame.height,
    ))
}
