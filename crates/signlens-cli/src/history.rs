use anyhow::Result;

use signlens_storage::StoredRecord;

use crate::app::App;

/// List saved records, newest first.
pub async fn run_history(limit: usize, json: bool) -> Result<()> {
    let app = App::load()?;
    let storage = app.open_storage()?;
    let records = storage.list_records(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No saved records");
        return Ok(());
    }
    for stored in &records {
        println!("{}", history_line(stored));
    }
    Ok(())
}

fn history_line(stored: &StoredRecord) -> String {
    let when = chrono::DateTime::from_timestamp_millis(stored.created_at)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".into());
    let video = if stored.has_video { "  [video]" } else { "" };
    format!(
        "{when}  {}  {} ({}, {}){video}",
        stored.id, stored.record.business_name, stored.record.category, stored.record.detected_language
    )
}
