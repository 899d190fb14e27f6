//! Collaborator traits for the hosted model and the device location.

use async_trait::async_trait;
use bytes::Bytes;

use signlens_types::{
    AnalysisError, BusinessRecord, CapturedImage, GeoContext, VideoGenError, VideoHandle,
    VideoRequest,
};

/// Supplies the API key for one call.
///
/// Passed explicitly into every provider call so a key changed at runtime is
/// picked up by the next request.
pub trait CredentialSource: Send + Sync {
    /// Current API key, if any.
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|k| !k.trim().is_empty())
    }
}

/// A fixed key.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub String);

impl CredentialSource for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Turns a signboard photo into structured business data.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Analyze one image. Single shot; callers must not expect retries.
    async fn analyze(
        &self,
        image: &CapturedImage,
        locality_hint: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<BusinessRecord, AnalysisError>;
}

/// Turns coordinates into a "City, State" style label.
#[async_trait]
pub trait LocalityResolver: Send + Sync {
    async fn resolve_locality(
        &self,
        latitude: f64,
        longitude: f64,
        credentials: &dyn CredentialSource,
    ) -> Result<String, AnalysisError>;
}

/// Long-running promotional video generation.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Start generation and wait until the operation reaches a terminal state.
    async fn generate_video(
        &self,
        request: &VideoRequest,
        credentials: &dyn CredentialSource,
    ) -> Result<VideoHandle, VideoGenError>;
    /// Fetch the generated file.
    async fn download_video(
        &self,
        handle: &VideoHandle,
        credentials: &dyn CredentialSource,
    ) -> Result<Bytes, VideoGenError>;
}

/// One-shot device position query. Never fails; failures are carried in the result.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn current_position(&self) -> GeoContext;
}
