use clap::Parser;
use tracing_subscriber::EnvFilter;

use track_downloader_lib::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("track_downloader=info,track_downloader_lib=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();
    track_downloader_lib::run(config).await
}
