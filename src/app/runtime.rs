//! Runtime initialization and setup

use crate::app::{config::AppConfig, logging::init_logging};
use crate::config::DockhandConfig;
use crate::docker::DockerClient;
use crate::subprocess::SubprocessManager;
use anyhow::Result;
use tracing::debug;

/// Load configuration, start logging and build the docker client
pub fn initialize_app(app: &AppConfig) -> Result<DockerClient> {
    let config = DockhandConfig::load(app.config_path.as_deref())?;
    init_logging(app, &config.log_level);

    debug!(
        "Using {} via {} (kill grace {:?}, timeout {:?})",
        config.docker_binary,
        config.shell,
        config.kill_grace(),
        config.command_timeout()
    );

    Ok(DockerClient::new(&SubprocessManager::production(), config))
}
