//! Lexicon uploader: resumable chunked uploads of large media files.

mod config;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use lexicon_protocol::{MediaType, UploadState};
use lexicon_transfer::{ChunkSource, FileSource, UploadMetadata, format_bytes};
use lexicon_upload::{HttpTransport, RunOutcome, SessionTransport, UploadSessionManager};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "lexicon-upload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.config/lexicon/upload.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file in resumable chunks
    Upload {
        file: PathBuf,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// Use the chunked protocol even below the size threshold
        #[arg(long)]
        force: bool,
    },

    /// Continue an interrupted upload
    Resume {
        upload_id: String,

        file: PathBuf,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// List the chunks the server is still missing
    Status { upload_id: String },

    /// Delete an upload session on the server
    Cancel { upload_id: String },
}

#[derive(Args)]
struct MetadataArgs {
    /// Title of the media file (defaults to the file name without extension)
    #[arg(short, long)]
    title: Option<String>,

    #[arg(short, long)]
    description: Option<String>,

    /// Make the media file public
    #[arg(long)]
    public: bool,

    /// OTHER, MUSIC, VIDEO, AUDIOBOOK or AUDIO
    #[arg(long, default_value = "OTHER")]
    media_type: MediaType,

    /// MIME type (guessed from the extension when omitted)
    #[arg(long)]
    content_type: Option<String>,
}

impl MetadataArgs {
    fn into_metadata(self, file: &Path, config: &CliConfig) -> anyhow::Result<UploadMetadata> {
        if config.user_id.is_empty() {
            bail!("user_id is not set in the configuration file");
        }
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", file.display()))?;
        let title = match self.title {
            Some(title) => title,
            None => file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| filename.clone()),
        };
        let content_type = self
            .content_type
            .unwrap_or_else(|| mime_guess::from_path(file).first_or_octet_stream().to_string());

        Ok(UploadMetadata {
            filename,
            content_type,
            owner_id: config.user_id.clone(),
            title,
            description: self.description,
            is_public: self.public,
            media_type: self.media_type,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;
    tracing::debug!(api_url = %config.api_url, "configuration loaded");

    let transport = Arc::new(HttpTransport::new(
        &config.api_url,
        config.transport_options(),
    )?);

    match cli.command {
        Commands::Upload {
            file,
            metadata,
            force,
        } => {
            let source = open_source(&file)?;
            let size = source.len();
            if !config.upload.requires_chunked_upload(size) && !force {
                bail!(
                    "{} is {}, below the chunked upload threshold of {}; pass --force to upload it anyway",
                    file.display(),
                    format_bytes(size),
                    format_bytes(config.upload.large_file_threshold)
                );
            }
            let metadata = metadata.into_metadata(&file, &config)?;
            let manager = Arc::new(UploadSessionManager::new(
                transport,
                source,
                metadata,
                &config.upload,
            )?);
            run(manager, &file, false).await
        }
        Commands::Resume {
            upload_id,
            file,
            metadata,
        } => {
            let source = open_source(&file)?;
            let metadata = metadata.into_metadata(&file, &config)?;
            let manager = Arc::new(UploadSessionManager::attach(
                transport,
                source,
                metadata,
                &config.upload,
                upload_id,
            )?);
            run(manager, &file, true).await
        }
        Commands::Status { upload_id } => {
            let resp = transport.missing_chunks(&upload_id).await?;
            if resp.missing_chunks.is_empty() {
                println!("{upload_id}: all chunks received, ready to finalize");
            } else {
                let list: Vec<String> = resp.missing_chunks.iter().map(u32::to_string).collect();
                println!(
                    "{upload_id}: {} chunk(s) missing: {}",
                    resp.missing_chunks.len(),
                    list.join(", ")
                );
            }
            Ok(())
        }
        Commands::Cancel { upload_id } => {
            transport.cancel(&upload_id).await?;
            println!("{upload_id}: cancelled");
            Ok(())
        }
    }
}

fn open_source(file: &Path) -> anyhow::Result<Arc<dyn ChunkSource>> {
    let source =
        FileSource::open(file).with_context(|| format!("cannot open {}", file.display()))?;
    Ok(Arc::new(source))
}

/// Runs `start` (or `resume`) with a progress bar. The first Ctrl-C pauses
/// at the next chunk boundary; during init it cancels instead.
async fn run(manager: Arc<UploadSessionManager>, file: &Path, resume: bool) -> anyhow::Result<()> {
    let events = manager
        .take_events()
        .context("event receiver already taken")?;
    let renderer = progress::spawn_renderer(events, &manager.progress())?;

    let weak = Arc::downgrade(&manager);
    let interrupt = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            match manager.pause() {
                Ok(()) => eprintln!("pausing after the current chunk..."),
                Err(_) if manager.state() == UploadState::Initializing => {
                    eprintln!("cancelling...");
                    if let Err(e) = manager.cancel().await {
                        tracing::warn!(error = %e, "cancel failed");
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
    });

    let result = if resume {
        manager.resume().await
    } else {
        manager.start().await
    };
    interrupt.abort();

    let upload_id = manager.upload_id();
    drop(manager);
    let _ = renderer.await;

    let resume_hint = |id: &str| format!("lexicon-upload resume {id} {}", file.display());
    match result {
        Ok(RunOutcome::Completed(media)) => {
            println!("uploaded \"{}\" as media {}", media.title, media.id);
            Ok(())
        }
        Ok(RunOutcome::Paused) => {
            if let Some(id) = upload_id {
                println!("paused; continue with: {}", resume_hint(&id));
            }
            Ok(())
        }
        Err(e) => {
            if e.is_retryable()
                && let Some(id) = upload_id
            {
                eprintln!("retry with: {}", resume_hint(&id));
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> MetadataArgs {
        MetadataArgs {
            title: None,
            description: None,
            public: false,
            media_type: MediaType::Other,
            content_type: None,
        }
    }

    fn config() -> CliConfig {
        CliConfig {
            user_id: "42".into(),
            ..Default::default()
        }
    }

    #[test]
    fn cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "lexicon-upload",
            "upload",
            "movie.mp4",
            "--title",
            "Movie",
            "--public",
            "--media-type",
            "video",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload {
                file,
                metadata,
                force,
            } => {
                assert_eq!(file, PathBuf::from("movie.mp4"));
                assert_eq!(metadata.title.as_deref(), Some("Movie"));
                assert!(metadata.public);
                assert_eq!(metadata.media_type, MediaType::Video);
                assert!(!force);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn cli_parses_resume() {
        let cli = Cli::try_parse_from(["lexicon-upload", "resume", "up-1", "movie.mp4"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resume { ref upload_id, .. } if upload_id == "up-1"
        ));
    }

    #[test]
    fn cli_rejects_unknown_media_type() {
        assert!(
            Cli::try_parse_from(["lexicon-upload", "upload", "a.mp4", "--media-type", "podcast"])
                .is_err()
        );
    }

    #[test]
    fn metadata_guesses_content_type_and_title() {
        let metadata = args()
            .into_metadata(Path::new("/media/Concert Film.mkv"), &config())
            .unwrap();
        assert_eq!(metadata.filename, "Concert Film.mkv");
        assert_eq!(metadata.title, "Concert Film");
        assert_eq!(metadata.content_type, "video/x-matroska");
        assert_eq!(metadata.owner_id, "42");
    }

    #[test]
    fn metadata_unknown_extension_is_octet_stream() {
        let metadata = args()
            .into_metadata(Path::new("blob.zzqq"), &config())
            .unwrap();
        assert_eq!(metadata.content_type, "application/octet-stream");
    }

    #[test]
    fn metadata_requires_user_id() {
        let result = args().into_metadata(Path::new("a.mp4"), &CliConfig::default());
        assert!(result.is_err());
    }
}
