//! LinShare MCP server entry point.

mod app;
mod config;
mod handler;
mod handlers;
mod helpers;
mod state;
mod tools;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting LinShare MCP server"
    );

    let config = config::Config::load()?;
    tracing::info!(
        upload_dir = %config.upload_path().display(),
        linshare_configured = config.is_linshare_configured(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}
