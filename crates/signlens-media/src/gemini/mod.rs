//! Gemini REST adapter for analysis, locality lookup and video generation.

mod analysis;
mod video;

pub use analysis::{analysis_prompt, analysis_request_body, extract_text, parse_business_record};
pub use video::{operation_result, poll_operation, video_prompt, video_request_body};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use signlens_config::ProviderConfig;
use signlens_types::{
    AnalysisError, BusinessRecord, CapturedImage, VideoGenError, VideoHandle, VideoRequest,
};

use crate::types::{AnalysisProvider, CredentialSource, LocalityResolver, VideoProvider};

/// Low-level failure of one HTTP exchange, mapped into the caller's taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Network(String),
    Provider(String),
    Malformed(String),
}

impl From<CallError> for AnalysisError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Network(m) => AnalysisError::NetworkFailure(m),
            CallError::Provider(m) => AnalysisError::ProviderError(m),
            CallError::Malformed(m) => AnalysisError::MalformedResponse(m),
        }
    }
}

impl From<CallError> for VideoGenError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Network(m) => VideoGenError::ProviderError(format!("network: {m}")),
            CallError::Provider(m) => VideoGenError::ProviderError(m),
            CallError::Malformed(m) => VideoGenError::ProviderError(format!("malformed: {m}")),
        }
    }
}

/// Gemini / Veo client. Holds no credentials; every call takes them.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    analysis_model: String,
    locality_model: String,
    video_model: String,
    poll_interval: Duration,
    video_timeout: Duration,
}

impl GeminiClient {
    pub fn from_config(config: &ProviderConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            analysis_model: config.analysis_model.clone(),
            locality_model: config.locality_model.clone(),
            video_model: config.video_model.clone(),
            poll_interval: config.video_poll_interval(),
            video_timeout: config.video_timeout(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    fn api_key(credentials: &dyn CredentialSource) -> Result<String, CallError> {
        credentials
            .api_key()
            .ok_or_else(|| CallError::Provider("no API key available".into()))
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        credentials: &dyn CredentialSource,
    ) -> Result<Value, CallError> {
        let key = Self::api_key(credentials)?;
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::Network(e.to_string()))?;
        read_json(resp).await
    }

    async fn get_json(
        &self,
        url: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<Value, CallError> {
        let key = Self::api_key(credentials)?;
        let resp = self
            .client
            .get(url)
            .header("x-goog-api-key", key)
            .send()
            .await
            .map_err(|e| CallError::Network(e.to_string()))?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, CallError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| CallError::Network(e.to_string()))?;
    let json: Value = serde_json::from_str(&text).map_err(|e| {
        if status.is_success() {
            CallError::Malformed(format!("response is not JSON: {e}"))
        } else {
            CallError::Provider(format!("HTTP {status}: {}", truncate(&text, 200)))
        }
    })?;

    if !status.is_success() || json.get("error").is_some() {
        let msg = json
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        return Err(CallError::Provider(format!("HTTP {status}: {msg}")));
    }
    Ok(json)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl AnalysisProvider for GeminiClient {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn analyze(
        &self,
        image: &CapturedImage,
        locality_hint: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<BusinessRecord, AnalysisError> {
        let body = analysis_request_body(image, locality_hint);
        let url = self.model_url(&self.analysis_model, "generateContent");
        debug!(model = %self.analysis_model, bytes = image.len(), locality_hint, "Sending analysis request");

        let json = self.post_json(&url, &body, credentials).await.map_err(|e| {
            warn!("Gemini analysis failed: {e:?}");
            AnalysisError::from(e)
        })?;
        let text = extract_text(&json)?;
        let record = parse_business_record(&text)?;
        debug!(business = %record.business_name, "Parsed analysis response");
        Ok(record)
    }
}

#[async_trait]
impl LocalityResolver for GeminiClient {
    async fn resolve_locality(
        &self,
        latitude: f64,
        longitude: f64,
        credentials: &dyn CredentialSource,
    ) -> Result<String, AnalysisError> {
        let prompt = format!(
            "I am at Latitude: {latitude}, Longitude: {longitude}. What is the most likely City \
             and State name? Answer with JUST the \"City, State\". Example: \"Mumbai, Maharashtra\"."
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let url = self.model_url(&self.locality_model, "generateContent");
        let json = self.post_json(&url, &body, credentials).await?;
        let text = extract_text(&json)?;
        let label = text.trim().trim_matches('"').trim().to_string();
        if label.is_empty() {
            return Err(AnalysisError::MalformedResponse("empty locality".into()));
        }
        Ok(label)
    }
}

#[async_trait]
impl VideoProvider for GeminiClient {
    async fn generate_video(
        &self,
        request: &VideoRequest,
        credentials: &dyn CredentialSource,
    ) -> Result<VideoHandle, VideoGenError> {
        let body = video_request_body(request);
        let url = self.model_url(&self.video_model, "predictLongRunning");
        info!(model = %self.video_model, business = %request.business_name, "Video generation started");

        let initial = self.post_json(&url, &body, credentials).await?;
        let handle = poll_operation(initial, self.poll_interval, self.video_timeout, |name| {
            let url = format!("{}/{name}", self.base_url);
            async move {
                debug!(operation = %name, "Polling video status");
                self.get_json(&url, credentials).await
            }
        })
        .await?;
        info!(uri = %handle.uri, "Video ready");
        Ok(handle)
    }

    async fn download_video(
        &self,
        handle: &VideoHandle,
        credentials: &dyn CredentialSource,
    ) -> Result<Bytes, VideoGenError> {
        let key = Self::api_key(credentials)?;
        let resp = self
            .client
            .get(&handle.uri)
            .header("x-goog-api-key", key)
            .send()
            .await
            .map_err(|e| CallError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VideoGenError::ProviderError(format!(
                "video download failed: HTTP {status}"
            )));
        }
        resp.bytes()
            .await
            .map_err(|e| CallError::Network(e.to_string()).into())
    }
}
