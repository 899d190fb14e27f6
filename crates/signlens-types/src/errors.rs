use thiserror::Error;

use crate::AnalysisStage;

/// Failure to acquire or read the camera.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Frame encoding failed: {0}")]
    Encoding(String),
}

/// Failure of the hosted analysis call. Terminal for the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Failure of video generation. Scoped to the result view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoGenError {
    #[error("Video provider error: {0}")]
    ProviderError(String),
    #[error("Video generation timed out after {0}s")]
    Timeout(u64),
}

/// Failure of the geolocation query. Never surfaced as a blocking error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Unable to retrieve your location: {0}")]
    Unavailable(String),
}

/// An action was applied in a stage that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[must_use]
pub enum TransitionError {
    #[error("Illegal transition: `{action}` in stage {from}")]
    Illegal {
        from: AnalysisStage,
        action: &'static str,
    },
}
