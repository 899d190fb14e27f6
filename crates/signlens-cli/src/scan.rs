use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use signlens_capture::{CaptureSource, StillImageCamera};
use signlens_storage::RecordStore;
use signlens_types::{AgentStatus, AgentTask, AnalysisStage, Locality};
use signlens_workflow::{ScanController, VideoState, locate};

use crate::app::App;
use crate::video::write_video;

/// Analyze one signboard photo end to end.
pub async fn run_scan(
    image: PathBuf,
    coordinates: Option<(f64, f64)>,
    video: bool,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let app = App::load()?;
    if !app.has_api_key() {
        bail!(
            "No API key found; set {} in the environment or in .env",
            app.config.provider.api_key_env
        );
    }

    let locality = resolve(&app, coordinates).await?;
    eprintln!("Location: {}", locality.label());

    let storage = app.storage();
    let camera = Arc::new(StillImageCamera::new(&image));
    let capture = CaptureSource::new(camera, app.config.capture.jpeg_quality);
    let mut controller =
        ScanController::new(capture, app.gemini.clone(), app.credentials.clone(), &app.config);
    if let Some(store) = &storage {
        controller = controller.with_store(store.clone());
    }
    controller.set_locality(locality);

    if let Err(e) = controller.start_capture().await {
        controller.cancel()?;
        return Err(e).with_context(|| format!("Cannot read {}", image.display()));
    }

    let cancel = CancellationToken::new();
    let renderer = tokio::spawn(render_progress(
        controller.subscribe_progress(),
        cancel.clone(),
    ));
    let outcome = controller.capture().await;
    cancel.cancel();
    let _ = renderer.await;

    match outcome.context("Capture failed")? {
        AnalysisStage::Complete => {}
        _ => {
            let message = controller
                .stage()
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".into());
            controller.reset()?;
            bail!("Analysis failed: {message}");
        }
    }

    let Some(presenter) = controller.presenter_mut() else {
        bail!("No result to show");
    };

    if video {
        eprintln!("Generating video, this can take a few minutes...");
        presenter
            .generate_video(app.gemini.as_ref(), app.credentials.as_ref())
            .await;
        if let VideoState::Ready(_) = presenter.video() {
            let store = storage.map(|s| s as Arc<dyn RecordStore>);
            match presenter
                .archive_video(app.gemini.as_ref(), app.credentials.as_ref(), store)
                .await
            {
                Ok(bytes) => {
                    let path = out.unwrap_or_else(|| {
                        PathBuf::from(format!(
                            "{}.mp4",
                            presenter.record_id().unwrap_or("signlens")
                        ))
                    });
                    write_video(&path, &bytes).await?;
                }
                Err(e) => eprintln!("Video download failed: {e}"),
            }
        }
    }

    if json {
        let value = json!({
            "id": presenter.record_id(),
            "locality": presenter.locality().label(),
            "record": presenter.record(),
            "video": match presenter.video() {
                VideoState::Ready(handle) => json!(handle.uri),
                _ => serde_json::Value::Null,
            },
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", presenter.render_text());
    }

    presenter.wait_for_upload().await;
    controller.wait_for_save().await;
    Ok(())
}

/// Print the resolved place for coordinates or this host.
pub async fn run_locate(coordinates: Option<(f64, f64)>) -> Result<()> {
    let app = App::load()?;
    let locality = resolve(&app, coordinates).await?;
    println!("{}", locality.label());
    Ok(())
}

async fn resolve(app: &App, coordinates: Option<(f64, f64)>) -> Result<Locality> {
    let geo = app.geo_provider(coordinates)?;
    eprintln!("{}", Locality::PENDING_LABEL);
    let (_, locality) = locate(
        geo.as_ref(),
        app.gemini.as_ref(),
        app.credentials.as_ref(),
        app.config.provider.request_timeout(),
    )
    .await;
    Ok(locality)
}

/// Print one line whenever a task changes status.
async fn render_progress(mut rx: watch::Receiver<Vec<AgentTask>>, cancel: CancellationToken) {
    let mut shown: Vec<AgentStatus> = Vec::new();
    loop {
        {
            let tasks = rx.borrow_and_update();
            if shown.len() != tasks.len() {
                shown = vec![AgentStatus::Pending; tasks.len()];
            }
            for (task, last) in tasks.iter().zip(shown.iter_mut()) {
                if task.status != *last {
                    *last = task.status;
                    eprintln!("{}", progress_line(task));
                }
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn progress_line(task: &AgentTask) -> String {
    let mark = match task.status {
        AgentStatus::Pending => ' ',
        AgentStatus::Working => '~',
        AgentStatus::Done => 'x',
    };
    format!("[{mark}] {:<20} {:>3.0}%  {}", task.name, task.progress, task.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: AgentStatus, progress: f64, message: &str) -> AgentTask {
        AgentTask {
            id: "vision".into(),
            name: "Vision Agent".into(),
            status,
            progress,
            message: message.into(),
        }
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(
            progress_line(&task(AgentStatus::Working, 49.6, "Analyzing image...")),
            "[~] Vision Agent          50%  Analyzing image..."
        );
        assert_eq!(
            progress_line(&task(AgentStatus::Done, 100.0, "Complete")),
            "[x] Vision Agent         100%  Complete"
        );
    }

    #[tokio::test]
    async fn test_render_progress_stops_on_cancel() {
        let (_tx, rx) = watch::channel(vec![task(AgentStatus::Pending, 0.0, "Waiting")]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(render_progress(rx, cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
