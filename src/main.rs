use anyhow::{Context, Result};
use clap::Parser;
use heallink_voice::{create_router, AppState, Config};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "heallink-voice", about = "Voice conversation session service")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/heallink-voice")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);
    info!("Voice gateway: {}", cfg.voice.gateway_url);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("HTTP server error")?;

    Ok(())
}
