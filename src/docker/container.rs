use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::cli::DockerCli;
use super::models::{ContainerInspect, ContainerRunSpec, ContainerStats, TaskInspect};
use super::table::TableDecoder;
use crate::error::{DockhandError, ErrorCode, Result};
use crate::subprocess::{LineBuffer, RunningProcess};

/// Value of `BASH_ENV` for commands run with `docker exec`
pub const EXEC_BASH_ENV: &str = "/root/.bashrc";

#[derive(Clone)]
pub struct ContainerOps {
    cli: DockerCli,
}

impl ContainerOps {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    /// Whether a container with this exact name exists
    pub async fn exists(&self, container: &str) -> Result<bool> {
        let command = self
            .cli
            .command(&["inspect", container])
            .combine_stderr(true)
            .build();
        let result = self.cli.query(command).await?;
        let success = result.success();
        let output = LineBuffer::from_lines(result.lines);

        if output.contains_exact("[]") && output.contains_prefix("Error: No such object:") {
            return Ok(false);
        }
        if !success {
            tracing::debug!("docker inspect {} failed: {}", container, output.text());
            return Ok(false);
        }
        Ok(output.contains_substring(&format!("\"Name\": \"/{}\",", container)))
    }

    pub async fn kill(&self, container: &str) -> Result<()> {
        self.cli
            .check(self.cli.command(&["kill", container]).combine_stderr(true).build())
            .await?;
        Ok(())
    }

    pub async fn rm(&self, container: &str) -> Result<()> {
        self.cli
            .check(self.cli.command(&["rm", container]).combine_stderr(true).build())
            .await?;
        Ok(())
    }

    pub fn run_args(spec: &ContainerRunSpec) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if spec.remove_on_exit {
            args.push("--rm".to_string());
        }
        if let Some(name) = spec.name.as_deref().filter(|n| !n.is_empty()) {
            args.push("--name".to_string());
            args.push(name.to_string());
        }
        if let Some(network) = spec.network.as_deref().filter(|n| !n.is_empty()) {
            args.push(format!("--network={}", network));
        }
        args.extend(spec.args.iter().cloned());
        args.push(spec.image.clone());
        args
    }

    /// `docker run` to completion; the token stops the container's client process
    pub async fn run(&self, spec: &ContainerRunSpec, cancel: CancellationToken) -> Result<Vec<String>> {
        let command = self
            .cli
            .streaming(&Self::run_args(spec))
            .envs(&spec.env)
            .combine_stderr(true)
            .cancel_on(cancel)
            .build();
        Ok(self.cli.check(command).await?.lines)
    }

    pub fn exec_args(container: &str, command: &str, env: &BTreeMap<String, String>) -> Vec<String> {
        let mut env = env.clone();
        env.entry("BASH_ENV".to_string())
            .or_insert_with(|| EXEC_BASH_ENV.to_string());

        let mut args = vec!["exec".to_string()];
        for (key, value) in &env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(container.to_string());
        args.push("/bin/bash".to_string());
        args.push("-c".to_string());
        args.push(command.to_string());
        args
    }

    /// Start a command inside the container and stream its output
    pub fn exec(
        &self,
        container: &str,
        command: &str,
        env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> RunningProcess {
        let command = self
            .cli
            .streaming(&Self::exec_args(container, command, env))
            .cancel_on(cancel)
            .build();
        self.cli.spawn(command)
    }

    /// Run a command inside the container and return its output lines
    pub async fn exec_and_wait(
        &self,
        container: &str,
        command: &str,
        env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<Vec<String>> {
        let result = self.exec(container, command, env, cancel).collect().await;
        if result.success() {
            return Ok(result.lines);
        }

        Err(DockhandError::execution_with_code(
            ErrorCode::EXEC_SUBPROCESS_FAILED,
            format!("docker exec failed:\n{}", result.diagnostic_output()),
            Some(result.command.clone()),
        )
        .with_exit_code(result.exit_code()))
    }

    /// Copy a host file into the container, creating the target directory first
    pub async fn cp(
        &self,
        container: &str,
        source: &str,
        destination: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        let target_dir = match Path::new(destination).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let mkdir = format!("mkdir -p {}", shell_words::quote(&target_dir));
        if let Err(e) = self
            .exec_and_wait(container, &mkdir, &BTreeMap::new(), cancel.clone())
            .await
        {
            tracing::debug!("Could not create {} in {}: {}", target_dir, container, e);
        }

        let target = format!("{}:{}", container, destination);
        let command = self
            .cli
            .streaming(&["cp", source, target.as_str()])
            .combine_stderr(true)
            .cancel_on(cancel)
            .build();
        self.cli.check(command).await?;
        Ok(())
    }

    pub async fn logs(&self, container: &str, tail: u32) -> Result<Vec<String>> {
        let tail = tail.to_string();
        let command = self
            .cli
            .command(&["logs", container, "--tail", tail.as_str()])
            .combine_stderr(true)
            .build();
        Ok(self.cli.check(command).await?.lines)
    }

    pub async fn inspect(&self, container: &str) -> Result<Option<ContainerInspect>> {
        self.cli.inspect(&["inspect", container]).await
    }

    /// Inspect a swarm task by id; the container id is shortened
    pub async fn inspect_task(&self, task: &str) -> Result<Option<TaskInspect>> {
        self.cli.inspect(&["inspect", task]).await
    }

    /// One `docker stats` sample of the given containers, or of all running ones
    pub async fn stats(&self, containers: &[String]) -> Result<Vec<ContainerStats>> {
        let mut args = vec![
            "stats".to_string(),
            "--no-stream".to_string(),
            "--format".to_string(),
            ContainerStats::FORMAT.to_string(),
        ];
        args.extend(containers.iter().cloned());

        let result = self.cli.check(self.cli.command(&args).build()).await?;
        Ok(TableDecoder::piped(ContainerStats::MIN_FIELDS)
            .decode(&result.lines, ContainerStats::from_fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DockhandConfig;
    use crate::subprocess::{MockProcessRunner, SubprocessManager};

    fn ops() -> (ContainerOps, MockProcessRunner) {
        let (manager, mock) = SubprocessManager::mock();
        (
            ContainerOps::new(DockerCli::new(&manager, DockhandConfig::default())),
            mock,
        )
    }

    #[tokio::test]
    async fn test_exists_matches_exact_name() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_stdout("[\n    {\n        \"Id\": \"abc\",\n        \"Name\": \"/web\",\n        \"Driver\": \"overlay2\"\n    }\n]")
            .finish();

        assert!(ops.exists("web").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_false_for_missing_container() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect ghost")
            .returns_stdout("[]")
            .returns_stderr("Error: No such object: ghost")
            .returns_exit_code(1)
            .finish();

        assert!(!ops.exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_false_when_name_differs() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_stdout("[{\n        \"Name\": \"/web-2\",\n}]")
            .finish();

        assert!(!ops.exists("web").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_errors_when_docker_cannot_start() {
        let (ops, _mock) = ops();
        // No expectation: the mock reports a spawn failure
        let err = ops.exists("web").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_SPAWN_FAILED);
    }

    #[test]
    fn test_run_args() {
        let spec = ContainerRunSpec {
            name: Some("builder".to_string()),
            network: Some("ci".to_string()),
            image: "alpine:3".to_string(),
            args: vec!["-v".to_string(), "/src:/src".to_string()],
            remove_on_exit: true,
            env: BTreeMap::new(),
        };
        assert_eq!(
            ContainerOps::run_args(&spec),
            vec!["run", "--rm", "--name", "builder", "--network=ci", "-v", "/src:/src", "alpine:3"]
        );

        let bare = ContainerRunSpec {
            image: "alpine".to_string(),
            ..ContainerRunSpec::default()
        };
        assert_eq!(ContainerOps::run_args(&bare), vec!["run", "alpine"]);
    }

    #[tokio::test]
    async fn test_run_failure_carries_output() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker run")
            .returns_stdout("Unable to find image 'nope:latest' locally")
            .returns_stderr("docker: Error response from daemon: pull access denied")
            .returns_exit_code(125)
            .finish();

        let spec = ContainerRunSpec {
            image: "nope".to_string(),
            ..ContainerRunSpec::default()
        };
        let err = ops.run(&spec, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.tool_exit_code(), Some(125));
        assert!(err.to_string().contains("pull access denied"));
        assert!(err.to_string().contains("Unable to find image"));
    }

    #[test]
    fn test_exec_args_adds_bash_env() {
        let mut env = BTreeMap::new();
        env.insert("STAGE".to_string(), "build".to_string());
        let args = ContainerOps::exec_args("ci-1", "make all", &env);
        assert_eq!(
            args,
            vec![
                "exec",
                "-e",
                "BASH_ENV=/root/.bashrc",
                "-e",
                "STAGE=build",
                "ci-1",
                "/bin/bash",
                "-c",
                "make all"
            ]
        );
    }

    #[tokio::test]
    async fn test_exec_streams_lines() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker exec")
            .returns_lines(&["step 1", "step 2"])
            .finish();

        let running = ops.exec("ci-1", "make", &BTreeMap::new(), CancellationToken::new());
        let (mut output, exit) = running.into_parts();
        assert_eq!(output.next_line().await.as_deref(), Some("step 1"));
        assert_eq!(output.next_line().await.as_deref(), Some("step 2"));
        assert_eq!(exit.code().await, 0);
    }

    #[tokio::test]
    async fn test_exec_and_wait_failure() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker exec")
            .returns_stdout("make: *** No rule to make target")
            .returns_exit_code(2)
            .finish();

        let err = ops
            .exec_and_wait("ci-1", "make", &BTreeMap::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.tool_exit_code(), Some(2));
        assert!(err.to_string().contains("docker exec failed"));
    }

    #[tokio::test]
    async fn test_cp_creates_directory_then_copies() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker exec").returns_success().finish();
        mock.expect_command("docker cp").returns_success().finish();

        ops.cp(
            "ci-1",
            "/var/lib/dist/Dockerfile",
            "/app/dist/Dockerfile",
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let lines = mock.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("'mkdir -p /app/dist'"));
        assert!(lines[1].starts_with("docker cp /var/lib/dist/Dockerfile "));
        assert!(lines[1].contains("ci-1:/app/dist/Dockerfile"));
    }

    #[tokio::test]
    async fn test_logs_uses_tail() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker logs web --tail 50")
            .returns_lines(&["started", "listening"])
            .finish();

        assert_eq!(ops.logs("web", 50).await.unwrap(), vec!["started", "listening"]);
    }

    #[tokio::test]
    async fn test_inspect_missing_is_none() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect ghost")
            .returns_stdout("[]")
            .returns_stderr("Error: No such object: ghost")
            .returns_exit_code(1)
            .finish();

        assert!(ops.inspect("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inspect_daemon_failure_is_error() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_stderr("Cannot connect to the Docker daemon")
            .returns_exit_code(1)
            .finish();

        let err = ops.inspect("web").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
        assert!(err.to_string().contains("Cannot connect"));
    }

    #[tokio::test]
    async fn test_inspect_killed_without_output_is_error() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_exit_code(137)
            .finish();

        let err = ops.inspect("web").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
        assert_eq!(err.tool_exit_code(), Some(137));
    }

    #[tokio::test]
    async fn test_inspect_empty_success_is_decode_error() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_success()
            .finish();

        let err = ops.inspect("web").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DECODE_INVALID_JSON);
    }

    #[tokio::test]
    async fn test_inspect_garbage_is_decode_error() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect web")
            .returns_stdout("WARNING: something odd")
            .finish();

        let err = ops.inspect("web").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DECODE_INVALID_JSON);
        assert!(err.to_string().contains("WARNING: something odd"));
    }

    #[tokio::test]
    async fn test_inspect_task_shortens_container_id() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker inspect t1")
            .returns_stdout(
                r#"[{"ID": "t1", "Status": {"ContainerStatus": {"ContainerID": "0123456789abcdef"}}}]"#,
            )
            .finish();

        let task = ops.inspect_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status.container_status.container_id, "0123456789ab");
    }

    #[tokio::test]
    async fn test_stats_decodes_rows() {
        let (ops, mut mock) = ops();
        mock.expect_command("docker stats --no-stream")
            .returns_lines(&[
                "CONTAINER|CPU %|MEM %|MEM USAGE / LIMIT",
                "web|0.07%|0.43%|33.36MiB / 7.586GiB",
                "broken|1%",
                "db|12.5%|4%|512KiB / 1GiB",
            ])
            .finish();

        let stats = ops.stats(&[]).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].container_id, "web");
        assert!((stats[0].memory_usage_mb - 33.36).abs() < 1e-9);
        assert_eq!(stats[1].cpu_usage_percent, 12.5);
        assert!((stats[1].memory_usage_mb - 0.5).abs() < 1e-9);
        assert_eq!(stats[1].memory_limit_mb, 1024.0);
    }
}
