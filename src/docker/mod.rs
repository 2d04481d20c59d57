//! Docker operations on top of the process runner
//!
//! Every operation builds a `docker` command line, runs it through the
//! configured [`ProcessRunner`](crate::subprocess::ProcessRunner) and decodes
//! the captured output:
//!
//! - tables (`--format "table ..."`) with [`table`]
//! - memory columns with [`size`]
//! - inspect JSON with [`inspect`]
//! - `docker events` JSON lines with [`events`]
//!
//! A failing command becomes an error that carries the tool's output verbatim.

pub mod cli;
pub mod container;
pub mod events;
pub mod hub;
pub mod images;
pub mod inspect;
pub mod models;
pub mod node;
pub mod service;
pub mod size;
pub mod table;

pub use cli::DockerCli;
pub use container::ContainerOps;
pub use events::{DockerEvent, EventFilter, EventStream, EventWatcher};
pub use hub::HubOps;
pub use images::ImageOps;
pub use inspect::{
    decode_inspect, first_record, is_not_found, short_id, DecodeError, InspectRecord,
    NOT_FOUND_SENTINELS,
};
pub use models::*;
pub use node::NodeOps;
pub use service::ServiceOps;
pub use size::{parse_byte_size, parse_usage_pair};
pub use table::{decode_table, TableDecoder};

use crate::config::DockhandConfig;
use crate::subprocess::SubprocessManager;

/// Go template printing only the daemon version
pub const SERVER_VERSION_FORMAT: &str = "{{.Server.Version}}";

/// Entry point grouping every docker operation over one runner
#[derive(Clone)]
pub struct DockerClient {
    cli: DockerCli,
    pub container: ContainerOps,
    pub service: ServiceOps,
    pub node: NodeOps,
    pub images: ImageOps,
    pub hub: HubOps,
    pub events: EventWatcher,
}

impl DockerClient {
    pub fn new(subprocess: &SubprocessManager, config: DockhandConfig) -> Self {
        let cli = DockerCli::new(subprocess, config);
        Self {
            container: ContainerOps::new(cli.clone()),
            service: ServiceOps::new(cli.clone()),
            node: NodeOps::new(cli.clone()),
            images: ImageOps::new(cli.clone()),
            hub: HubOps::new(cli.clone()),
            events: EventWatcher::new(cli.clone()),
            cli,
        }
    }

    pub fn cli(&self) -> &DockerCli {
        &self.cli
    }

    /// Server version, or an empty string when the daemon cannot be reached
    pub async fn version(&self) -> String {
        let command = self
            .cli
            .command(&["version", "--format", SERVER_VERSION_FORMAT])
            .build();
        match self.cli.check(command).await {
            Ok(result) => result.text().trim().to_string(),
            Err(e) => {
                tracing::warn!("Could not read docker server version: {}", e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_version() {
        let (manager, mut mock) = SubprocessManager::mock();
        mock.expect_command("docker version --format")
            .returns_lines(&["24.0.7"])
            .finish();

        let client = DockerClient::new(&manager, DockhandConfig::default());
        assert_eq!(client.version().await, "24.0.7");
    }

    #[tokio::test]
    async fn test_version_empty_when_daemon_is_down() {
        let (manager, mut mock) = SubprocessManager::mock();
        mock.expect_command("docker version")
            .returns_stderr("Cannot connect to the Docker daemon at unix:///var/run/docker.sock")
            .returns_exit_code(1)
            .finish();

        let client = DockerClient::new(&manager, DockhandConfig::default());
        assert_eq!(client.version().await, "");
    }

    #[tokio::test]
    async fn test_operations_share_one_runner() {
        let (manager, mut mock) = SubprocessManager::mock();
        mock.expect_command("docker").returns_success().finish();

        let client = DockerClient::new(&manager, DockhandConfig::default());
        client.service.restart("web").await.unwrap();
        client.container.kill("web.1").await.unwrap();

        assert_eq!(mock.command_lines().len(), 2);
    }
}
