use std::future::Future;
use std::time::Duration;

use base64::Engine;
use serde_json::{Value, json};
use tokio::time::Instant;

use signlens_types::{VideoGenError, VideoHandle, VideoRequest};

use super::CallError;

pub fn video_prompt(request: &VideoRequest) -> String {
    let summary = request.summary.trim().trim_end_matches('.');
    format!(
        "A cinematic, professional commercial shot of a {} named \"{}\" in {}. {summary}. \
         The signboard text is in {}. High quality, 4k, slow motion, warm lighting, bustling atmosphere.",
        request.category, request.business_name, request.locality, request.detected_language,
    )
}

/// `predictLongRunning` body. The reference frame, when present, seeds image-to-video.
pub fn video_request_body(request: &VideoRequest) -> Value {
    let mut instance = json!({ "prompt": video_prompt(request) });
    if let Some(image) = &request.reference_image {
        instance["image"] = json!({
            "bytesBase64Encoded": base64::engine::general_purpose::STANDARD.encode(image.bytes()),
            "mimeType": image.mime_type(),
        });
    }
    json!({
        "instances": [instance],
        "parameters": {
            "aspectRatio": "16:9",
            "resolution": "720p"
        }
    })
}

/// Terminal outcome of an operation, or `None` while it is still running.
pub fn operation_result(operation: &Value) -> Option<Result<VideoHandle, VideoGenError>> {
    if !operation
        .get("done")
        .and_then(|d| d.as_bool())
        .unwrap_or(false)
    {
        return None;
    }

    if let Some(error) = operation.get("error") {
        let msg = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        return Some(Err(VideoGenError::ProviderError(msg.to_string())));
    }

    let uri = [
        "/response/generateVideoResponse/generatedSamples/0/video/uri",
        "/response/generatedVideos/0/video/uri",
    ]
    .iter()
    .find_map(|p| operation.pointer(p).and_then(|u| u.as_str()));

    Some(match uri {
        Some(uri) => Ok(VideoHandle {
            uri: uri.to_string(),
        }),
        None => Err(VideoGenError::ProviderError(
            "No video URI returned".into(),
        )),
    })
}

/// Poll a long-running operation every `interval` until it is done.
///
/// Gives up with `Timeout` once another poll would pass `timeout`.
pub async fn poll_operation<F, Fut>(
    initial: Value,
    interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<VideoHandle, VideoGenError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Value, CallError>>,
{
    let name = initial
        .get("name")
        .and_then(|n| n.as_str())
        .map(String::from);
    let deadline = Instant::now() + timeout;
    let mut operation = initial;

    loop {
        if let Some(result) = operation_result(&operation) {
            return result;
        }
        let Some(name) = name.as_deref() else {
            return Err(VideoGenError::ProviderError(
                "operation has no name".into(),
            ));
        };
        if Instant::now() + interval > deadline {
            return Err(VideoGenError::Timeout(timeout.as_secs()));
        }
        tokio::time::sleep(interval).await;
        operation = fetch(name.to_string()).await?;
    }
}
