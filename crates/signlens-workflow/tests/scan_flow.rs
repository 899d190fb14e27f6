use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use signlens_capture::{CameraBackend, CaptureSource, Facing, LiveStream, RawFrame};
use signlens_config::SignLensConfig;
use signlens_media::{AnalysisProvider, CredentialSource, StaticCredentials, VideoProvider};
use signlens_storage::{RecordStore, SignLensStorage, StorageError};
use signlens_types::{
    AgentStatus, AnalysisError, AnalysisStage, BusinessRecord, CaptureError, CapturedImage,
    Locality, VideoGenError, VideoHandle, VideoRequest,
};
use signlens_workflow::{ControllerError, ScanController, VideoState};

// ──────────────────── Fakes ────────────────────

struct FakeStream {
    live: Arc<AtomicUsize>,
    shade: u8,
    stopped: bool,
}

impl LiveStream for FakeStream {
    fn current_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::DeviceUnavailable("stopped".into()));
        }
        Ok(RawFrame::solid(8, 6, [self.shade, 0, 0]))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct FakeCamera {
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
    deny: bool,
}

#[async_trait]
impl CameraBackend for FakeCamera {
    fn id(&self) -> &str {
        "fake"
    }

    async fn open(&self, _facing: Facing) -> Result<Box<dyn LiveStream>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live: self.live.clone(),
            shade: 40u8.wrapping_add((n as u8).wrapping_mul(100)),
            stopped: false,
        }))
    }
}

struct FakeAnalysis {
    delay: Duration,
    result: Result<BusinessRecord, AnalysisError>,
    hints: Mutex<Vec<String>>,
}

impl FakeAnalysis {
    fn new(delay: Duration, result: Result<BusinessRecord, AnalysisError>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            result,
            hints: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AnalysisProvider for FakeAnalysis {
    fn id(&self) -> &str {
        "fake"
    }

    async fn analyze(
        &self,
        _image: &CapturedImage,
        locality_hint: &str,
        _credentials: &dyn CredentialSource,
    ) -> Result<BusinessRecord, AnalysisError> {
        self.hints.lock().unwrap().push(locality_hint.to_string());
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn save_record(&self, _id: &str, _record: &BusinessRecord) -> signlens_storage::Result<()> {
        Err(StorageError::Json(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        ))
    }

    async fn upload_video(&self, _id: &str, _video: Bytes) -> signlens_storage::Result<()> {
        Ok(())
    }
}

struct BrokenVideo;

#[async_trait]
impl VideoProvider for BrokenVideo {
    async fn generate_video(
        &self,
        _request: &VideoRequest,
        _credentials: &dyn CredentialSource,
    ) -> Result<VideoHandle, VideoGenError> {
        Err(VideoGenError::ProviderError("model overloaded".into()))
    }

    async fn download_video(
        &self,
        _handle: &VideoHandle,
        _credentials: &dyn CredentialSource,
    ) -> Result<Bytes, VideoGenError> {
        Err(VideoGenError::ProviderError("nothing to download".into()))
    }
}

// ──────────────────── Helpers ────────────────────

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn record() -> BusinessRecord {
    BusinessRecord {
        business_name: "Lakshmi Tiffin Centre".into(),
        transliteration: None,
        category: "Restaurant".into(),
        confidence: 82.0,
        products: vec![],
        address_context: String::new(),
        summary: "Idli and dosa from 6am.".into(),
        detected_language: "Tamil".into(),
    }
}

fn controller(camera: Arc<FakeCamera>, analysis: Arc<FakeAnalysis>) -> ScanController {
    ScanController::new(
        CaptureSource::new(camera, 80),
        analysis,
        Arc::new(StaticCredentials("test-key".into())),
        &SignLensConfig::default(),
    )
}

async fn capture_and_process(c: &mut ScanController) -> AnalysisStage {
    c.start_capture().await.unwrap();
    c.capture().await.unwrap()
}

// ──────────────────── Join semantics ────────────────────

#[tokio::test(start_paused = true)]
async fn test_fast_success_waits_for_dwell() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(1000), Ok(record())));
    let stage_rx = c.subscribe_stage();
    let progress_rx = c.subscribe_progress();

    c.start_capture().await.unwrap();
    let started = Instant::now();
    let (outcome, ()) = tokio::join!(c.capture(), async {
        tokio::time::sleep(ms(710)).await;
        let tasks = progress_rx.borrow().clone();
        assert_eq!(tasks[0].status, AgentStatus::Working);
        assert!((tasks[0].progress - 50.0).abs() < 1e-6);

        // the call has finished but the dwell has not
        tokio::time::sleep(ms(1290)).await;
        assert_eq!(*stage_rx.borrow(), AnalysisStage::Processing);
    });

    assert_eq!(outcome.unwrap(), AnalysisStage::Complete);
    assert_eq!(started.elapsed(), ms(3800));
    assert_eq!(c.stage().record().unwrap().business_name, "Lakshmi Tiffin Centre");
    assert_eq!(*c.subscribe_stage().borrow(), AnalysisStage::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_slow_success_waits_for_call() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(5000), Ok(record())));

    c.start_capture().await.unwrap();
    let started = Instant::now();
    assert_eq!(c.capture().await.unwrap(), AnalysisStage::Complete);
    assert_eq!(started.elapsed(), ms(5000));
}

#[tokio::test(start_paused = true)]
async fn test_immediate_failure_skips_dwell() {
    let camera = Arc::new(FakeCamera::default());
    let err = AnalysisError::ProviderError("API key not valid".into());
    let mut c = controller(camera, FakeAnalysis::new(Duration::ZERO, Err(err.clone())));

    c.start_capture().await.unwrap();
    let started = Instant::now();
    assert_eq!(c.capture().await.unwrap(), AnalysisStage::Error);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(c.stage().error(), Some(&err));
    assert!(c.stage().record().is_none());
    assert!(c.presenter().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_late_failure_reported_when_call_settles() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(
        camera,
        FakeAnalysis::new(
            ms(2000),
            Err(AnalysisError::MalformedResponse("no text".into())),
        ),
    );

    c.start_capture().await.unwrap();
    let started = Instant::now();
    assert_eq!(c.capture().await.unwrap(), AnalysisStage::Error);
    assert_eq!(started.elapsed(), ms(2000));
}

#[tokio::test(start_paused = true)]
async fn test_simulator_stops_when_processing_ends() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(
        camera,
        FakeAnalysis::new(ms(300), Err(AnalysisError::NetworkFailure("offline".into()))),
    );
    let progress_rx = c.subscribe_progress();

    assert_eq!(capture_and_process(&mut c).await, AnalysisStage::Error);
    let frozen = progress_rx.borrow().clone();
    assert!(frozen.iter().any(|t| t.status != AgentStatus::Done));

    tokio::time::sleep(ms(5000)).await;
    assert_eq!(*progress_rx.borrow(), frozen);
}

// ──────────────────── Camera lifecycle ────────────────────

#[tokio::test(start_paused = true)]
async fn test_cancel_releases_camera() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera.clone(), FakeAnalysis::new(ms(0), Ok(record())));

    c.start_capture().await.unwrap();
    assert!(c.camera_live());
    assert_eq!(camera.live.load(Ordering::SeqCst), 1);

    c.cancel().unwrap();
    assert_eq!(c.kind(), AnalysisStage::Idle);
    assert!(!c.camera_live());
    assert_eq!(camera.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_capture_releases_camera() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera.clone(), FakeAnalysis::new(ms(0), Ok(record())));

    capture_and_process(&mut c).await;
    assert_eq!(camera.live.load(Ordering::SeqCst), 0);
    assert_eq!(c.stage().image().unwrap().width, 8);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_controller_releases_camera() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera.clone(), FakeAnalysis::new(ms(0), Ok(record())));
    c.start_capture().await.unwrap();
    drop(c);
    assert_eq!(camera.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_denied_camera_stays_capturing_until_closed() {
    let camera = Arc::new(FakeCamera {
        deny: true,
        ..FakeCamera::default()
    });
    let mut c = controller(camera, FakeAnalysis::new(ms(0), Ok(record())));

    let err = c.start_capture().await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Capture(CaptureError::PermissionDenied)
    ));
    assert_eq!(c.kind(), AnalysisStage::Capturing);
    assert_eq!(c.capture_error(), Some(&CaptureError::PermissionDenied));

    // nothing to snapshot
    assert!(matches!(
        c.capture().await,
        Err(ControllerError::Capture(CaptureError::DeviceUnavailable(_)))
    ));

    c.cancel().unwrap();
    assert_eq!(c.kind(), AnalysisStage::Idle);
    assert!(c.capture_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_illegal_actions_propagate() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(0), Ok(record())));

    assert!(matches!(c.capture().await, Err(ControllerError::Transition(_))));
    assert!(matches!(c.reset(), Err(ControllerError::Transition(_))));
    assert!(matches!(c.cancel(), Err(ControllerError::Transition(_))));
    assert_eq!(c.kind(), AnalysisStage::Idle);
}

// ──────────────────── Reset & data ────────────────────

#[tokio::test(start_paused = true)]
async fn test_reset_leaves_no_stale_data() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(100), Ok(record())));
    let progress_rx = c.subscribe_progress();

    capture_and_process(&mut c).await;
    let first_image = c.stage().image().unwrap().clone();
    let last_progress = progress_rx.borrow().clone();
    c.reset().unwrap();

    assert_eq!(c.kind(), AnalysisStage::Idle);
    assert!(c.stage().image().is_none());
    assert!(c.stage().record().is_none());
    assert!(c.record_id().is_none());
    assert!(c.presenter().is_none());
    // progress is only cleared when the next run starts
    assert_eq!(*progress_rx.borrow(), last_progress);

    c.start_capture().await.unwrap();
    assert!(c.stage().record().is_none());
    let (outcome, ()) = tokio::join!(c.capture(), async {
        tokio::time::sleep(ms(20)).await;
        assert!(progress_rx
            .borrow()
            .iter()
            .all(|t| t.status == AgentStatus::Pending));
    });
    outcome.unwrap();
    assert_ne!(c.stage().image().unwrap(), &first_image);
}

#[tokio::test(start_paused = true)]
async fn test_locality_hint() {
    let camera = Arc::new(FakeCamera::default());
    let analysis = FakeAnalysis::new(ms(0), Ok(record()));
    let mut c = controller(camera, analysis.clone());

    capture_and_process(&mut c).await;
    c.reset().unwrap();

    c.set_locality(Locality::Unknown);
    capture_and_process(&mut c).await;
    c.reset().unwrap();

    c.set_locality(Locality::Resolved("Madurai, Tamil Nadu".into()));
    capture_and_process(&mut c).await;

    assert_eq!(
        *analysis.hints.lock().unwrap(),
        vec!["India", "India", "Madurai, Tamil Nadu"]
    );
}

// ──────────────────── Collaborators ────────────────────

#[tokio::test]
async fn test_completed_record_is_saved() {
    let storage = Arc::new(SignLensStorage::open_in_memory().unwrap());
    let camera = Arc::new(FakeCamera::default());
    let mut config = SignLensConfig::default();
    config.workflow.dwell_ms = 0;
    let mut c = ScanController::new(
        CaptureSource::new(camera, 80),
        FakeAnalysis::new(ms(0), Ok(record())),
        Arc::new(StaticCredentials("k".into())),
        &config,
    )
    .with_store(storage.clone());

    assert_eq!(capture_and_process(&mut c).await, AnalysisStage::Complete);
    let id = c.record_id().unwrap().to_string();

    c.wait_for_save().await;
    let saved = storage.get_record(&id).await.unwrap();
    assert_eq!(saved.unwrap().record, record());
    assert_eq!(c.presenter().unwrap().record_id(), Some(id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_does_not_change_outcome() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(0), Ok(record())))
        .with_store(Arc::new(FailingStore));

    assert_eq!(capture_and_process(&mut c).await, AnalysisStage::Complete);
    c.wait_for_save().await;
    assert_eq!(c.kind(), AnalysisStage::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_video_failure_stays_in_presenter() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(0), Ok(record())));
    capture_and_process(&mut c).await;

    let creds = StaticCredentials("k".into());
    let presenter = c.presenter_mut().unwrap();
    let state = presenter.generate_video(&BrokenVideo, &creds).await;
    assert!(matches!(state, VideoState::Failed(VideoGenError::ProviderError(_))));
    assert_eq!(c.kind(), AnalysisStage::Complete);
    assert!(c.stage().record().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_presenter_video_state_is_shared() {
    let camera = Arc::new(FakeCamera::default());
    let mut c = controller(camera, FakeAnalysis::new(ms(0), Ok(record())));
    capture_and_process(&mut c).await;

    assert!(c.presenter_mut().unwrap().begin_video().is_some());
    // a second lookup sees the request already in flight
    assert_eq!(c.presenter().unwrap().video(), &VideoState::Generating);
    assert!(c.presenter_mut().unwrap().begin_video().is_none());

    c.reset().unwrap();
    assert!(c.presenter().is_none());
}
