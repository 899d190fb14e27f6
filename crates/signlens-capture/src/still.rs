//! Camera backend that serves a still image file as its live stream.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use signlens_types::CaptureError;

use crate::types::{CameraBackend, Facing, LiveStream, RawFrame};

/// Treats an image on disk as a camera with no known facing.
///
/// Used on hosts without a camera, e.g. the CLI scanning a photo file.
pub struct StillImageCamera {
    path: PathBuf,
    facing: Facing,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            facing: Facing::Any,
        }
    }

    /// Report the file as coming from a camera with the given facing.
    pub fn with_facing(path: impl Into<PathBuf>, facing: Facing) -> Self {
        Self {
            path: path.into(),
            facing,
        }
    }
}

#[async_trait]
impl CameraBackend for StillImageCamera {
    fn id(&self) -> &str {
        "still-image"
    }

    async fn open(&self, facing: Facing) -> Result<Box<dyn LiveStream>, CaptureError> {
        if facing != Facing::Any && facing != self.facing {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no {facing:?} camera"
            )));
        }

        let data = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            _ => CaptureError::DeviceUnavailable(format!("{}: {e}", self.path.display())),
        })?;

        let decoded = image::load_from_memory(&data)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("cannot decode image: {e}")))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        debug!(path = %self.path.display(), width, height, "Still image stream opened");

        Ok(Box::new(StillStream {
            frame: RawFrame {
                width,
                height,
                rgb: decoded.into_raw(),
            },
            stopped: false,
        }))
    }
}

struct StillStream {
    frame: RawFrame,
    stopped: bool,
}

impl LiveStream for StillStream {
    fn current_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::DeviceUnavailable("stream stopped".into()));
        }
        Ok(self.frame.clone())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::CaptureSource;

    fn write_png(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("board.png");
        let img = image::RgbImage::from_pixel(40, 30, image::Rgb([250, 140, 20]));
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_still_camera_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let source = CaptureSource::new(Arc::new(StillImageCamera::new(path)), 80);

        let mut handle = source.open().await.unwrap();
        assert_eq!(handle.facing(), Facing::Any);
        let image = source.capture_frame(&mut handle).unwrap();
        assert_eq!((image.width, image.height), (40, 30));
    }

    #[tokio::test]
    async fn test_still_camera_with_rear_facing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let source = CaptureSource::new(
            Arc::new(StillImageCamera::with_facing(path, Facing::Environment)),
            80,
        );
        let handle = source.open().await.unwrap();
        assert_eq!(handle.facing(), Facing::Environment);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let camera = StillImageCamera::new("/definitely/not/here.jpg");
        let err = camera.open(Facing::Any).await.err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let err = StillImageCamera::new(path)
            .open(Facing::Any)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }
}
