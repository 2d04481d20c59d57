use super::cli::DockerCli;
use crate::error::Result;

#[derive(Clone)]
pub struct ImageOps {
    cli: DockerCli,
}

impl ImageOps {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    /// Pull an image; registry output is returned as-is
    pub async fn pull(&self, image: &str) -> Result<Vec<String>> {
        tracing::info!("Pulling {}", image);
        let command = self
            .cli
            .streaming(&["pull", image])
            .combine_stderr(true)
            .build();
        Ok(self.cli.check(command).await?.lines)
    }

    pub fn clear_command_line(&self) -> String {
        let docker = self.cli.binary();
        format!(
            "{docker} rmi $({docker} images -f \"dangling=true\" -q) && {docker} builder prune -f && {docker} system prune -f"
        )
    }

    /// Remove dangling images, then prune the build cache and unused data
    pub async fn clear(&self) -> Result<Vec<String>> {
        let command = self.cli.shell_line(self.clear_command_line()).build();
        Ok(self.cli.check(command).await?.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DockhandConfig;
    use crate::error::ErrorCode;
    use crate::subprocess::{MockProcessRunner, SubprocessManager};

    fn ops(config: DockhandConfig) -> (ImageOps, MockProcessRunner) {
        let (manager, mock) = SubprocessManager::mock();
        (ImageOps::new(DockerCli::new(&manager, config)), mock)
    }

    #[tokio::test]
    async fn test_pull_returns_progress() {
        let (ops, mut mock) = ops(DockhandConfig::default());
        mock.expect_command("docker pull")
            .returns_lines(&["latest: Pulling from library/redis", "Status: Image is up to date"])
            .finish();

        let lines = ops.pull("redis:latest").await.unwrap();
        assert_eq!(lines.len(), 2);

        let history = mock.get_call_history();
        assert!(history[0].combine_stderr);
        assert!(history[0].timeout.is_none());
    }

    #[tokio::test]
    async fn test_pull_failure_keeps_daemon_message() {
        let (ops, mut mock) = ops(DockhandConfig::default());
        mock.expect_command("docker pull")
            .returns_stderr("Error response from daemon: manifest for redis:nope not found")
            .returns_exit_code(1)
            .finish();

        let err = ops.pull("redis:nope").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
        assert!(err.to_string().contains("manifest for redis:nope not found"));
    }

    #[test]
    fn test_clear_command_line_uses_configured_binary() {
        let config = DockhandConfig {
            docker_binary: "/opt/docker/bin/docker".to_string(),
            ..DockhandConfig::default()
        };
        let (ops, _mock) = ops(config);
        assert_eq!(
            ops.clear_command_line(),
            "/opt/docker/bin/docker rmi $(/opt/docker/bin/docker images -f \"dangling=true\" -q) \
             && /opt/docker/bin/docker builder prune -f && /opt/docker/bin/docker system prune -f"
        );
    }

    #[tokio::test]
    async fn test_clear_runs_pipeline() {
        let (ops, mut mock) = ops(DockhandConfig::default());
        mock.expect_command("docker rmi $(docker images")
            .returns_lines(&["Total reclaimed space: 0B"])
            .finish();

        assert_eq!(ops.clear().await.unwrap(), vec!["Total reclaimed space: 0B"]);
    }
}
