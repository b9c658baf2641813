//! Development server command.

use std::path::Path;

use anyhow::Result;
use quill_server::DevServer;

use crate::config::load_config;

/// Run the dev server.
pub async fn run(config_path: &Path, port: u16, open: bool) -> Result<()> {
    tracing::info!("Starting development server on port {}", port);

    let config = load_config(config_path)?.server_config(port, open);

    DevServer::new(config).start().await?;

    Ok(())
}
