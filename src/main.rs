use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use website_to_video::config::{ConfigManager, FileConfigManager};
use website_to_video::pipeline::FailureReport;
use website_to_video::{CancelHandle, GenerationOptions, PipelineOrchestrator, SourceRequest};

/// Temporary files older than this belong to runs that died mid-write.
const STALE_PARTIAL_AGE: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "website-to-video", about = "Generate a short advertisement video from a website")]
struct Cli {
    /// Page to turn into a video
    url: String,
    /// Config file, created with defaults when missing
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Max images to scrape (default from config)
    #[arg(long)]
    max_images: Option<usize>,
    /// Max summary length in characters
    #[arg(long)]
    max_chars: Option<usize>,
    /// Requested video length in seconds
    #[arg(long)]
    duration: Option<u32>,
    /// Where finished videos are stored
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Remove expired artifacts and stale temporary files first
    #[arg(long)]
    prune: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = FileConfigManager::new(cli.config.clone()).load_config().await?;
    if let Some(dir) = cli.output_dir {
        config.storage.directory = dir;
    }

    let mut options = GenerationOptions::from_config(&config.pipeline);
    if let Some(max_images) = cli.max_images {
        options.max_images = max_images;
    }
    if let Some(max_chars) = cli.max_chars {
        options.max_summary_chars = max_chars;
    }
    if let Some(duration) = cli.duration {
        options.duration_seconds = duration;
    }
    let request = SourceRequest::new(cli.url, options)?;

    let orchestrator = PipelineOrchestrator::from_config(&config)?;

    if cli.prune {
        let store = orchestrator.store();
        let expired = store.prune_expired().await?;
        let partials = store.remove_stale_partials(STALE_PARTIAL_AGE).await?;
        info!("Maintenance removed {} expired and {} partial files", expired, partials);
    }

    let (handle, signal) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling run");
            handle.cancel();
        }
    });

    match orchestrator.run_with_cancel(&request, signal).await {
        Ok(artifact) => {
            println!("{}", artifact.local_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&FailureReport::from(&e))?);
            Err(e.into())
        }
    }
}
