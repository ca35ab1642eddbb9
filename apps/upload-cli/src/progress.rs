//! Terminal progress rendering for upload events.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use lexicon_protocol::UploadProgress;
use lexicon_transfer::format_duration;
use lexicon_upload::UploadEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn bar_style() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")?
        .progress_chars("=>-"))
}

/// Status line shown next to the bar.
pub fn status_line(progress: &UploadProgress) -> String {
    let eta = progress
        .eta_seconds
        .map(|secs| format_duration(Duration::from_secs_f64(secs)))
        .unwrap_or_else(|| "unknown".into());
    format!(
        "chunk {}/{} ({:.0}%), ETA {eta}",
        progress.uploaded_chunks,
        progress.total_chunks,
        progress.percentage()
    )
}

/// Drives a progress bar from `events` until the channel closes.
pub fn spawn_renderer(
    mut events: mpsc::Receiver<UploadEvent>,
    initial: &UploadProgress,
) -> anyhow::Result<JoinHandle<()>> {
    let pb = ProgressBar::new(initial.total_bytes);
    pb.set_style(bar_style()?);
    pb.set_position(initial.bytes_transferred);
    pb.enable_steady_tick(Duration::from_millis(120));

    Ok(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::StateChanged { state } => pb.set_message(state.to_string()),
                UploadEvent::ChunkUploaded { progress, .. } => {
                    pb.set_position(progress.bytes_transferred);
                    pb.set_message(status_line(&progress));
                }
                UploadEvent::Completed { artifact } => {
                    pb.set_position(pb.length().unwrap_or(0));
                    pb.finish_with_message(format!("done (media {})", artifact.id));
                }
                UploadEvent::Failed { error } => pb.abandon_with_message(error),
            }
        }
        if !pb.is_finished() {
            pb.abandon();
        }
    }))
}
