//! Stage state machine.
//!
//! `Idle → Capturing → Processing → Complete | Error → Idle`, plus
//! `Capturing → Idle` on cancel. The data each stage may hold lives inside
//! its variant, so an image without a run or a record outside `Complete`
//! cannot be represented.

use std::sync::Arc;

use tracing::{debug, error};

use signlens_types::{AnalysisError, AnalysisStage, BusinessRecord, CapturedImage, TransitionError};

#[derive(Debug, Clone, Default)]
pub enum Stage {
    #[default]
    Idle,
    Capturing,
    Processing {
        image: CapturedImage,
    },
    Complete {
        image: CapturedImage,
        record: Arc<BusinessRecord>,
    },
    Error {
        image: CapturedImage,
        error: AnalysisError,
    },
}

impl Stage {
    pub fn kind(&self) -> AnalysisStage {
        match self {
            Stage::Idle => AnalysisStage::Idle,
            Stage::Capturing => AnalysisStage::Capturing,
            Stage::Processing { .. } => AnalysisStage::Processing,
            Stage::Complete { .. } => AnalysisStage::Complete,
            Stage::Error { .. } => AnalysisStage::Error,
        }
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        match self {
            Stage::Processing { image }
            | Stage::Complete { image, .. }
            | Stage::Error { image, .. } => Some(image),
            Stage::Idle | Stage::Capturing => None,
        }
    }

    pub fn record(&self) -> Option<&Arc<BusinessRecord>> {
        match self {
            Stage::Complete { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match self {
            Stage::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Owns the current [`Stage`] and applies the legal transitions.
///
/// Every other (stage, action) pair is rejected with
/// [`TransitionError::Illegal`] and leaves the stage untouched.
#[derive(Debug, Default)]
pub struct StageMachine {
    stage: Stage,
}

impl StageMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn kind(&self) -> AnalysisStage {
        self.stage.kind()
    }

    /// `Idle → Capturing`.
    pub fn start_capture(&mut self) -> Result<(), TransitionError> {
        match self.stage {
            Stage::Idle => self.enter(AnalysisStage::Idle, Stage::Capturing, "start_capture"),
            _ => Err(self.illegal("start_capture")),
        }
    }

    /// `Capturing → Idle`.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.stage {
            Stage::Capturing => self.enter(AnalysisStage::Capturing, Stage::Idle, "cancel"),
            _ => Err(self.illegal("cancel")),
        }
    }

    /// `Capturing → Processing`, storing the frame.
    pub fn image_captured(&mut self, image: CapturedImage) -> Result<(), TransitionError> {
        match self.stage {
            Stage::Capturing => self.enter(
                AnalysisStage::Capturing,
                Stage::Processing { image },
                "image_captured",
            ),
            _ => Err(self.illegal("image_captured")),
        }
    }

    /// `Processing → Complete`, storing the record.
    pub fn analysis_succeeded(&mut self, record: BusinessRecord) -> Result<(), TransitionError> {
        match std::mem::take(&mut self.stage) {
            Stage::Processing { image } => self.enter(
                AnalysisStage::Processing,
                Stage::Complete {
                    image,
                    record: Arc::new(record),
                },
                "analysis_succeeded",
            ),
            other => {
                self.stage = other;
                Err(self.illegal("analysis_succeeded"))
            }
        }
    }

    /// `Processing → Error`.
    pub fn analysis_failed(&mut self, error: AnalysisError) -> Result<(), TransitionError> {
        match std::mem::take(&mut self.stage) {
            Stage::Processing { image } => self.enter(
                AnalysisStage::Processing,
                Stage::Error { image, error },
                "analysis_failed",
            ),
            other => {
                self.stage = other;
                Err(self.illegal("analysis_failed"))
            }
        }
    }

    /// `Complete | Error → Idle`, dropping the image, record and error.
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        match self.stage {
            Stage::Complete { .. } | Stage::Error { .. } => {
                let from = self.stage.kind();
                self.enter(from, Stage::Idle, "reset")
            }
            _ => Err(self.illegal("reset")),
        }
    }

    fn enter(
        &mut self,
        from: AnalysisStage,
        next: Stage,
        action: &'static str,
    ) -> Result<(), TransitionError> {
        debug!(%from, to = %next.kind(), action, "Stage transition");
        self.stage = next;
        Ok(())
    }

    fn illegal(&self, action: &'static str) -> TransitionError {
        let from = self.stage.kind();
        error!(%from, action, "Illegal stage transition");
        TransitionError::Illegal { from, action }
    }
}
