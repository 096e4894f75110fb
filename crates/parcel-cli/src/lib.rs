//! Helpers shared by the `parcel` binary: batch assembly from paths and
//! progress formatting.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use parcel_client::{BatchReport, UploadEvent};
use parcel_core::{
    BatchSession, ErrorMetadata, ItemState, Payload, Session, UploadItem, Visibility,
};

/// Longest failure detail printed to the terminal.
pub const MAX_DETAIL_LEN: usize = 300;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Public visibility is only offered to callers who may publish.
pub fn resolve_visibility(public: bool, session: &Session) -> Result<Visibility> {
    if !public {
        return Ok(Visibility::Private);
    }
    if !session.can_publish() {
        bail!("--public requires the admin role (set PARCEL_API_ROLE=admin)");
    }
    Ok(Visibility::Public)
}

/// Reads a file into a Pending item. The display name defaults to the file stem.
pub async fn item_from_path(path: &Path) -> Result<UploadItem> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(UploadItem::new(Payload::with_detected_type(filename, bytes)))
}

/// Builds a batch in argument order. `names[i]` overrides the display name of
/// `files[i]`.
pub async fn build_batch(
    files: &[PathBuf],
    names: &[String],
    description: &str,
    visibility: Visibility,
) -> Result<BatchSession> {
    if names.len() > files.len() {
        bail!(
            "Got {} --name values for {} files; pass at most one name per file",
            names.len(),
            files.len()
        );
    }

    let mut batch = BatchSession::new();
    for (index, path) in files.iter().enumerate() {
        let mut item = item_from_path(path)
            .await?
            .with_description(description)
            .with_visibility(visibility);
        if let Some(name) = names.get(index).filter(|name| !name.trim().is_empty()) {
            item = item.with_display_name(name.trim());
        }
        batch.add(item)?;
    }
    Ok(batch)
}

fn describe_state(state: &ItemState) -> &'static str {
    match state {
        ItemState::Pending => "pending",
        ItemState::RequestingCredentials => "requesting upload credentials",
        ItemState::Transferring => "uploading to storage",
        ItemState::Confirming => "confirming",
        ItemState::Completed => "done",
        ItemState::Failed(_) => "failed",
    }
}

/// One progress line per state change. Other events are summarized at the end.
pub fn format_event(event: &UploadEvent, total: usize) -> Option<String> {
    match event {
        UploadEvent::BatchStarted { total } => Some(format!("Uploading {} file(s)", total)),
        UploadEvent::ItemStateChanged {
            position,
            filename,
            state,
            ..
        } => Some(format!(
            "[{}/{}] {}: {}",
            position + 1,
            total,
            filename,
            describe_state(state)
        )),
        _ => None,
    }
}

/// Human-readable summary of a finished run. `batch` is the session the run
/// left behind, used to name the files that were never attempted.
pub fn summarize(report: &BatchReport, batch: &BatchSession) -> Vec<String> {
    let mut lines = Vec::new();

    if report.succeeded() {
        lines.push(format!(
            "Uploaded {} file(s) in {:.1}s",
            report.completed.len(),
            report.elapsed().as_secs_f64()
        ));
    } else {
        lines.push(format!(
            "Upload aborted after {} of {} file(s)",
            report.completed.len(),
            report.completed.len() + report.not_attempted.len() + 1
        ));
    }

    for upload in &report.completed {
        lines.push(format!(
            "  {} -> {} (record {})",
            upload.filename, upload.stored_filename, upload.record.record_id
        ));
    }

    if let Some(failure) = &report.failure {
        lines.push(format!(
            "Error: {}",
            truncate_string(&failure.message, MAX_DETAIL_LEN)
        ));
        if let Some(action) = failure.error.suggested_action() {
            lines.push(format!("Hint: {}", action));
        }
    }

    if !report.not_attempted.is_empty() {
        let pending: Vec<&str> = report
            .not_attempted
            .iter()
            .filter_map(|id| batch.get(*id).map(|item| item.filename()))
            .collect();
        lines.push(format!(
            "Not attempted, resubmit these: {}",
            pending.join(", ")
        ));
    }

    lines
}
