//! Read-only view of a completed scan, plus its own video generation state.
//!
//! Video generation failures stay here; they never move the scan stage.

use std::fmt::Write as _;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use signlens_media::{CredentialSource, VideoProvider};
use signlens_storage::RecordStore;
use signlens_types::{
    BusinessRecord, CapturedImage, Locality, VideoGenError, VideoHandle, VideoRequest,
};

/// Progress of the optional promotional video.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VideoState {
    #[default]
    NotRequested,
    Generating,
    Ready(VideoHandle),
    Failed(VideoGenError),
}

impl VideoState {
    pub fn label(&self) -> &'static str {
        match self {
            VideoState::NotRequested => "not requested",
            VideoState::Generating => "generating",
            VideoState::Ready(_) => "ready",
            VideoState::Failed(_) => "failed",
        }
    }
}

pub struct ResultPresenter {
    record: Arc<BusinessRecord>,
    image: CapturedImage,
    locality: Locality,
    default_region: String,
    record_id: Option<String>,
    video: VideoState,
    pending_upload: Option<JoinHandle<()>>,
}

impl ResultPresenter {
    pub fn new(
        record: Arc<BusinessRecord>,
        image: CapturedImage,
        locality: Locality,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            record,
            image,
            locality,
            default_region: default_region.into(),
            record_id: None,
            video: VideoState::NotRequested,
            pending_upload: None,
        }
    }

    /// Attach the id the record was stored under, so a generated video can be archived with it.
    pub fn with_record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    pub fn record(&self) -> &BusinessRecord {
        &self.record
    }

    pub fn image(&self) -> &CapturedImage {
        &self.image
    }

    pub fn locality(&self) -> &Locality {
        &self.locality
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn video(&self) -> &VideoState {
        &self.video
    }

    /// Place used in the video prompt: address clues from the sign, then the
    /// resolved locality, then the default region.
    pub fn video_locality(&self) -> &str {
        let address = self.record.address_context.trim();
        if !address.is_empty() {
            return address;
        }
        self.locality.hint(&self.default_region)
    }

    pub fn video_request(&self) -> VideoRequest {
        VideoRequest {
            business_name: self.record.business_name.clone(),
            category: self.record.category.clone(),
            locality: self.video_locality().to_string(),
            summary: self.record.summary.clone(),
            detected_language: self.record.detected_language.clone(),
            reference_image: Some(self.image.clone()),
        }
    }

    /// Move to Generating and return the request to send.
    ///
    /// `None` while a request is in flight or a video is already ready.
    pub fn begin_video(&mut self) -> Option<VideoRequest> {
        match self.video {
            VideoState::Generating | VideoState::Ready(_) => None,
            VideoState::NotRequested | VideoState::Failed(_) => {
                self.video = VideoState::Generating;
                Some(self.video_request())
            }
        }
    }

    /// Land the outcome of a request started with [`begin_video`](Self::begin_video).
    pub fn finish_video(&mut self, result: Result<VideoHandle, VideoGenError>) -> &VideoState {
        self.video = match result {
            Ok(handle) => {
                info!(business = %self.record.business_name, uri = %handle.uri, "Video ready");
                VideoState::Ready(handle)
            }
            Err(e) => {
                warn!(business = %self.record.business_name, error = %e, "Video generation failed");
                VideoState::Failed(e)
            }
        };
        &self.video
    }

    /// Generate the promotional video and wait for the outcome.
    pub async fn generate_video(
        &mut self,
        provider: &dyn VideoProvider,
        credentials: &dyn CredentialSource,
    ) -> &VideoState {
        let Some(request) = self.begin_video() else {
            return &self.video;
        };
        info!(business = %request.business_name, locality = %request.locality, "Generating video");
        let result = provider.generate_video(&request, credentials).await;
        self.finish_video(result)
    }

    /// Download the ready video and store it under the record id in the background.
    ///
    /// Returns the downloaded bytes; the upload is not awaited, see
    /// [`wait_for_upload`](Self::wait_for_upload).
    pub async fn archive_video(
        &mut self,
        provider: &dyn VideoProvider,
        credentials: &dyn CredentialSource,
        store: Option<Arc<dyn RecordStore>>,
    ) -> Result<Bytes, VideoGenError> {
        let VideoState::Ready(handle) = &self.video else {
            return Err(VideoGenError::ProviderError("no video generated yet".into()));
        };
        let video = provider.download_video(handle, credentials).await?;
        info!(bytes = video.len(), "Video downloaded");

        if let (Some(store), Some(id)) = (store, self.record_id.clone()) {
            let upload = video.clone();
            self.pending_upload = Some(tokio::spawn(async move {
                if let Err(e) = store.upload_video(&id, upload).await {
                    warn!(id, error = %e, "Failed to store video");
                }
            }));
        }
        Ok(video)
    }

    /// Wait for the background video upload, if one is running.
    pub async fn wait_for_upload(&mut self) {
        if let Some(upload) = self.pending_upload.take() {
            if let Err(e) = upload.await {
                warn!(error = %e, "Video upload task failed");
            }
        }
    }

    /// Plain-text result card.
    pub fn render_text(&self) -> String {
        let r = &self.record;
        let mut out = String::new();

        match &r.transliteration {
            Some(t) => {
                let _ = writeln!(out, "{} ({t})", r.business_name);
            }
            None => {
                let _ = writeln!(out, "{}", r.business_name);
            }
        }
        let _ = writeln!(
            out,
            "{} | {} | {:.0}% confidence",
            r.category, r.detected_language, r.confidence
        );
        let _ = writeln!(out, "Location: {}", self.video_locality());
        let _ = writeln!(out, "{}", r.summary);

        if !r.products.is_empty() {
            let _ = writeln!(out, "\nProducts:");
            for p in &r.products {
                let mut line = format!("  - {}", p.name);
                if let Some(price) = &p.price {
                    let _ = write!(line, "  {price}");
                }
                if let Some(category) = &p.category {
                    let _ = write!(line, "  [{category}]");
                }
                let _ = writeln!(out, "{line}");
            }
        }

        match &self.video {
            VideoState::Ready(handle) => {
                let _ = writeln!(out, "\nVideo: {}", handle.uri);
            }
            VideoState::Failed(e) => {
                let _ = writeln!(out, "\nVideo: failed ({e})");
            }
            other => {
                let _ = writeln!(out, "\nVideo: {}", other.label());
            }
        }
        out
    }
}
