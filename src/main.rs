use futures::StreamExt;
use simple_video_downloader::{
    DownloadEvent, EngineConfig, EngineError, Progress, SessionController,
};
use tracing::error;

const DEFAULT_RESOLUTION: &str = "360p";

async fn run(url: &str, resolution: &str) -> Result<(), EngineError> {
    let config = EngineConfig::from_env()?;
    let mut controller = SessionController::from_config(config)?;

    let catalog = controller.preview(url).await?;
    println!("{}", catalog.title);
    println!("thumbnail: {}", catalog.thumbnail_url);
    println!("available: {}", catalog.resolution_labels().join(", "));

    let mut events = controller.download(resolution).await?;
    while let Some(event) = events.next().await {
        match event {
            DownloadEvent::Started { total_bytes, ranged } => match total_bytes {
                Some(total) => println!("downloading {} bytes (ranged: {})", total, ranged),
                None => println!("downloading, size unknown"),
            },
            DownloadEvent::Progress {
                progress: Progress::Percent(p),
                ..
            } => println!("{}%", p),
            DownloadEvent::Progress { bytes_written, .. } => println!("{} bytes", bytes_written),
            DownloadEvent::ResumedFromStart => println!("connection lost, restarting"),
            DownloadEvent::Completed { bytes_written } => {
                println!("done ({} bytes)", bytes_written)
            }
            DownloadEvent::Cancelled { .. } => println!("cancelled"),
            DownloadEvent::Failed(e) => return Err(e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simple_video_downloader=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("usage: simple-video-downloader <video-url> [resolution]");
        std::process::exit(2);
    };
    let resolution = args.next().unwrap_or_else(|| DEFAULT_RESOLUTION.to_string());

    if let Err(e) = run(&url, &resolution).await {
        error!("{}", e);
        return Err(e.into());
    }
    Ok(())
}
