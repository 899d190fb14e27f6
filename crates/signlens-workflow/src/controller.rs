//! Async driver around [`StageMachine`].
//!
//! Owns the camera stream while capturing, runs the analysis call against a
//! minimum dwell, drives the progress simulator during Processing, and hands
//! completed records to the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use signlens_capture::{CaptureSource, StreamHandle};
use signlens_config::{SignLensConfig, SimulatorConfig};
use signlens_media::{AnalysisProvider, CredentialSource};
use signlens_storage::{RecordStore, new_record_id};
use signlens_types::{
    AgentTask, AnalysisError, AnalysisStage, CaptureError, CapturedImage, Locality,
    TransitionError,
};

use crate::presenter::ResultPresenter;
use crate::simulator::{AGENT_TASKS, ProgressSimulator, initial_snapshot};
use crate::stage::{Stage, StageMachine};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Await `analysis` and a `dwell` timer together.
///
/// A success is returned only once both have finished. A failure is returned
/// as soon as the analysis settles; the remaining dwell is dropped.
pub async fn settle_with_dwell<F, T>(analysis: F, dwell: Duration) -> Result<T, AnalysisError>
where
    F: Future<Output = Result<T, AnalysisError>>,
{
    let dwell = async {
        tokio::time::sleep(dwell).await;
        Ok::<(), AnalysisError>(())
    };
    let (value, ()) = tokio::try_join!(analysis, dwell)?;
    Ok(value)
}

/// One scan session: capture, analyze, present, reset.
pub struct ScanController {
    machine: StageMachine,
    capture: CaptureSource,
    stream: Option<StreamHandle>,
    capture_error: Option<CaptureError>,
    analysis: Arc<dyn AnalysisProvider>,
    credentials: Arc<dyn CredentialSource>,
    store: Option<Arc<dyn RecordStore>>,
    locality: Locality,
    default_region: String,
    dwell: Duration,
    simulator: SimulatorConfig,
    progress: watch::Sender<Vec<AgentTask>>,
    stage_tx: watch::Sender<AnalysisStage>,
    record_id: Option<String>,
    presenter: Option<ResultPresenter>,
    pending_save: Option<JoinHandle<()>>,
}

impl ScanController {
    pub fn new(
        capture: CaptureSource,
        analysis: Arc<dyn AnalysisProvider>,
        credentials: Arc<dyn CredentialSource>,
        config: &SignLensConfig,
    ) -> Self {
        let (progress, _) = watch::channel(initial_snapshot(&AGENT_TASKS));
        let (stage_tx, _) = watch::channel(AnalysisStage::Idle);
        Self {
            machine: StageMachine::new(),
            capture,
            stream: None,
            capture_error: None,
            analysis,
            credentials,
            store: None,
            locality: Locality::Pending,
            default_region: config.locality.default_region.clone(),
            dwell: config.workflow.dwell(),
            simulator: config.simulator.clone(),
            progress,
            stage_tx,
            record_id: None,
            presenter: None,
            pending_save: None,
        }
    }

    /// Persist every completed record to `store`.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn stage(&self) -> &Stage {
        self.machine.stage()
    }

    pub fn kind(&self) -> AnalysisStage {
        self.machine.kind()
    }

    /// Error from the last camera open or frame read, shown inline while capturing.
    pub fn capture_error(&self) -> Option<&CaptureError> {
        self.capture_error.as_ref()
    }

    /// Whether a camera stream is currently held.
    pub fn camera_live(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamHandle::is_live)
    }

    pub fn locality(&self) -> &Locality {
        &self.locality
    }

    /// Update the locality. Only affects runs started afterwards.
    pub fn set_locality(&mut self, locality: Locality) {
        self.locality = locality;
    }

    /// Id under which the current record was saved.
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Vec<AgentTask>> {
        self.progress.subscribe()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<AnalysisStage> {
        self.stage_tx.subscribe()
    }

    /// `Idle → Capturing` and open the camera.
    ///
    /// If the camera cannot be opened the controller stays in Capturing with
    /// the error kept for display; call [`cancel`](Self::cancel) to close.
    pub async fn start_capture(&mut self) -> Result<(), ControllerError> {
        self.machine.start_capture()?;
        self.capture_error = None;
        self.publish_stage();

        match self.capture.open().await {
            Ok(handle) => {
                self.stream = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Camera unavailable");
                self.capture_error = Some(e.clone());
                Err(e.into())
            }
        }
    }

    /// `Capturing → Idle`, releasing the camera.
    pub fn cancel(&mut self) -> Result<(), ControllerError> {
        self.machine.cancel()?;
        if let Some(handle) = self.stream.take() {
            self.capture.close(handle);
        }
        self.capture_error = None;
        self.publish_stage();
        Ok(())
    }

    /// Snapshot the live stream and process the frame.
    pub async fn capture(&mut self) -> Result<AnalysisStage, ControllerError> {
        if self.machine.kind() != AnalysisStage::Capturing {
            let from = self.machine.kind();
            error!(%from, action = "capture", "Illegal stage transition");
            return Err(TransitionError::Illegal {
                from,
                action: "capture",
            }
            .into());
        }

        let result = match self.stream.as_mut() {
            Some(handle) => self.capture.capture_frame(handle),
            None => Err(CaptureError::DeviceUnavailable(
                "no camera stream open".into(),
            )),
        };
        let image = match result {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Frame capture failed");
                self.capture_error = Some(e.clone());
                return Err(e.into());
            }
        };
        self.stream = None;
        self.process(image).await
    }

    /// `Capturing → Processing`, then `Complete` or `Error`.
    ///
    /// Returns the stage the run ended in. Analysis failures are not errors
    /// here; they leave the controller in [`AnalysisStage::Error`].
    pub async fn process(&mut self, image: CapturedImage) -> Result<AnalysisStage, ControllerError> {
        self.machine.image_captured(image.clone())?;
        self.capture_error = None;
        if let Some(handle) = self.stream.take() {
            self.capture.close(handle);
        }
        self.publish_stage();

        let simulator = ProgressSimulator::new(self.simulator.clone()).spawn(self.progress.clone());

        let hint = self.locality.hint(&self.default_region).to_string();
        info!(
            provider = self.analysis.id(),
            locality = %hint,
            bytes = image.len(),
            "Analyzing image"
        );
        let analysis = self
            .analysis
            .analyze(&image, &hint, self.credentials.as_ref());
        let outcome = settle_with_dwell(analysis, self.dwell).await;

        let stopped = simulator.stop().await;
        debug!(?stopped, "Progress simulator stopped");

        match outcome {
            Ok(record) => {
                info!(
                    business = %record.business_name,
                    category = %record.category,
                    language = %record.detected_language,
                    "Analysis complete"
                );
                self.machine.analysis_succeeded(record)?;
                self.save_record();
                self.presenter = self.build_presenter();
            }
            Err(e) => {
                warn!(error = %e, "Analysis failed");
                self.machine.analysis_failed(e)?;
            }
        }

        self.publish_stage();
        Ok(self.machine.kind())
    }

    /// `Complete | Error → Idle`.
    pub fn reset(&mut self) -> Result<(), ControllerError> {
        self.machine.reset()?;
        self.record_id = None;
        self.presenter = None;
        self.publish_stage();
        Ok(())
    }

    /// Presenter for the current result; `None` unless Complete.
    ///
    /// There is one presenter per completed run, owned here, so its video
    /// state is shared by every caller until [`reset`](Self::reset).
    pub fn presenter(&self) -> Option<&ResultPresenter> {
        self.presenter.as_ref()
    }

    pub fn presenter_mut(&mut self) -> Option<&mut ResultPresenter> {
        self.presenter.as_mut()
    }

    /// Wait for the background save of the last record, if one is running.
    pub async fn wait_for_save(&mut self) {
        if let Some(save) = self.pending_save.take() {
            if let Err(e) = save.await {
                warn!(error = %e, "Record save task failed");
            }
        }
    }

    fn build_presenter(&self) -> Option<ResultPresenter> {
        match self.machine.stage() {
            Stage::Complete { image, record } => {
                let presenter = ResultPresenter::new(
                    record.clone(),
                    image.clone(),
                    self.locality.clone(),
                    self.default_region.clone(),
                );
                Some(match &self.record_id {
                    Some(id) => presenter.with_record_id(id.clone()),
                    None => presenter,
                })
            }
            _ => None,
        }
    }

    /// Hand the completed record to the store without waiting for it.
    fn save_record(&mut self) {
        let (Some(store), Some(record)) = (self.store.clone(), self.machine.stage().record().cloned())
        else {
            return;
        };
        let id = new_record_id();
        self.record_id = Some(id.clone());
        self.pending_save = Some(tokio::spawn(async move {
            match store.save_record(&id, &record).await {
                Ok(()) => debug!(id, "Record persisted"),
                Err(e) => warn!(id, error = %e, "Failed to persist record"),
            }
        }));
    }

    fn publish_stage(&self) {
        self.stage_tx.send_replace(self.machine.kind());
    }
}
