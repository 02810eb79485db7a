//! Application orchestrator: wires sessions, sweeper, LinShare client and
//! the stdio tool server together.

use std::sync::Arc;

use linshare_client::{ClientError, DocumentUploader, LinShareClient};
use linshare_tool_server::ToolServer;

use crate::config::Config;
use crate::handler::McpHandler;
use crate::state::ServerState;

/// Runs the server until stdin closes or SIGINT arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.ensure_directories()?;

    // -- LinShare handoff --
    let uploader: Option<Arc<dyn DocumentUploader>> =
        match LinShareClient::from_config(config.user_url.as_deref(), config.jwt_token.as_deref())
        {
            Ok(client) => {
                tracing::info!(url = client.base_url(), "LinShare handoff enabled");
                Some(Arc::new(client))
            }
            Err(ClientError::NotConfigured(what)) => {
                tracing::warn!("LinShare handoff disabled: {what}");
                None
            }
            Err(e) => return Err(e.into()),
        };

    let state = Arc::new(
        ServerState::new(config.upload_path(), config.download_path(), uploader)
            .with_sweep(config.sweep_interval(), config.session_max_age()),
    );

    // -- Session sweeper --
    state.sweeper.start();
    tracing::info!(
        interval_secs = state.sweeper.interval().as_secs(),
        max_age_secs = state.sweeper.max_age().as_secs(),
        "session sweeper started"
    );

    // -- Tool server --
    let server = ToolServer::new(McpHandler::new(Arc::clone(&state)));
    tracing::info!("serving MCP on stdio");

    let result = tokio::select! {
        r = server.run_stdio() => r.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            server.shutdown();
            Ok(())
        }
    };

    state.sweeper.stop();
    result
}
