use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use signlens_capture::{CaptureSource, StillImageCamera};
use signlens_storage::RecordStore;
use signlens_types::{BusinessRecord, Locality};
use signlens_workflow::{ResultPresenter, VideoState};

use crate::app::App;

/// Generate a promotional video for a stored record or a record JSON file.
pub async fn run_video(record: String, image: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let app = App::load()?;
    if !app.has_api_key() {
        bail!(
            "No API key found; set {} in the environment or in .env",
            app.config.provider.api_key_env
        );
    }

    let (record_id, business) = load_record(&app, &record).await?;

    let capture = CaptureSource::new(
        Arc::new(StillImageCamera::new(&image)),
        app.config.capture.jpeg_quality,
    );
    let mut stream = capture
        .open()
        .await
        .with_context(|| format!("Cannot read {}", image.display()))?;
    let frame = capture
        .capture_frame(&mut stream)
        .with_context(|| format!("Cannot encode {}", image.display()))?;

    let mut presenter = ResultPresenter::new(
        Arc::new(business),
        frame,
        Locality::Unknown,
        app.config.locality.default_region.clone(),
    );
    if let Some(id) = &record_id {
        presenter = presenter.with_record_id(id.clone());
    }

    eprintln!(
        "Generating video for {}, this can take a few minutes...",
        presenter.record().business_name
    );
    let state = presenter
        .generate_video(app.gemini.as_ref(), app.credentials.as_ref())
        .await;
    match state {
        VideoState::Ready(handle) => eprintln!("Video ready: {}", handle.uri),
        VideoState::Failed(e) => bail!("Video generation failed: {e}"),
        other => bail!("Video generation ended in state {}", other.label()),
    }

    // Only stored records get their video archived.
    let store = match &record_id {
        Some(_) => Some(app.open_storage()? as Arc<dyn RecordStore>),
        None => None,
    };
    let bytes = presenter
        .archive_video(app.gemini.as_ref(), app.credentials.as_ref(), store)
        .await
        .context("Video download failed")?;

    let path = out.unwrap_or_else(|| {
        PathBuf::from(format!("{}.mp4", record_id.as_deref().unwrap_or("signlens")))
    });
    write_video(&path, &bytes).await?;

    presenter.wait_for_upload().await;
    Ok(())
}

/// Resolve `record` as a file path first, then as a stored record id.
async fn load_record(app: &App, record: &str) -> Result<(Option<String>, BusinessRecord)> {
    let path = Path::new(record);
    if path.is_file() {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok((None, parse_record(&text)?));
    }

    let storage = app.open_storage()?;
    match storage.get_record(record).await? {
        Some(stored) => Ok((Some(stored.id), stored.record)),
        None => bail!("No record file or stored record named {record}"),
    }
}

/// Accepts either a bare record or the `scan --json` output.
fn parse_record(text: &str) -> Result<BusinessRecord> {
    let value: serde_json::Value = serde_json::from_str(text).context("Invalid record JSON")?;
    let value = match value.get("record") {
        Some(inner) => inner.clone(),
        None => value,
    };
    let record: BusinessRecord =
        serde_json::from_value(value).context("JSON is not a business record")?;
    Ok(record.normalized())
}

pub async fn write_video(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Saved video to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "businessName": "Sharma Electricals",
        "category": "Electronics",
        "confidence": 140,
        "summary": "Fans, wires and repairs.",
        "detectedLanguage": "Hindi"
    }"#;

    #[test]
    fn test_parse_bare_record() {
        let record = parse_record(RECORD).unwrap();
        assert_eq!(record.business_name, "Sharma Electricals");
        assert_eq!(record.confidence, 100.0);
        assert!(record.products.is_empty());
    }

    #[test]
    fn test_parse_scan_output() {
        let wrapped = format!(r#"{{"id": "abc", "locality": "Delhi", "record": {RECORD}}}"#);
        let record = parse_record(&wrapped).unwrap();
        assert_eq!(record.category, "Electronics");
    }

    #[test]
    fn test_parse_rejects_other_json() {
        assert!(parse_record(r#"{"name": "x"}"#).is_err());
        assert!(parse_record("not json").is_err());
    }
}
