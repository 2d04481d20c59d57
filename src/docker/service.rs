use super::cli::DockerCli;
use super::models::{ServiceCreateSpec, ServiceInspect, ServiceSummary, ServiceTask};
use super::table::TableDecoder;
use crate::error::Result;

/// Node role that schedules one task on every node
pub const GLOBAL_ROLE: &str = "global";

/// Bind mount added to every created service so tasks share the host clock
pub const LOCALTIME_MOUNT: &str = "type=bind,src=/etc/localtime,dst=/etc/localtime";

pub const UPDATE_DELAY: &str = "10s";

/// Swarm service management
#[derive(Clone)]
pub struct ServiceOps {
    cli: DockerCli,
}

impl ServiceOps {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    async fn update<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let command = self.cli.command(args).combine_stderr(true).build();
        self.cli.check(command).await?;
        Ok(())
    }

    pub async fn delete(&self, service: &str) -> Result<()> {
        self.update(&["service", "rm", service]).await
    }

    pub async fn set_image_and_replicas(&self, service: &str, image: &str, replicas: u32) -> Result<()> {
        let replicas = replicas.to_string();
        self.update(&[
            "service",
            "update",
            "--image",
            image,
            "--replicas",
            replicas.as_str(),
            "--update-delay",
            UPDATE_DELAY,
            "--with-registry-auth",
            service,
        ])
        .await
    }

    pub async fn set_image(&self, service: &str, image: &str) -> Result<()> {
        self.update(&[
            "service",
            "update",
            "--image",
            image,
            "--update-delay",
            UPDATE_DELAY,
            "--with-registry-auth",
            service,
        ])
        .await
    }

    pub async fn set_replicas(&self, service: &str, replicas: u32) -> Result<()> {
        let replicas = replicas.to_string();
        self.update(&[
            "service",
            "update",
            "--replicas",
            replicas.as_str(),
            "--with-registry-auth",
            service,
        ])
        .await
    }

    /// Force a rolling restart of every task
    pub async fn restart(&self, service: &str) -> Result<()> {
        self.update(&["service", "update", "--with-registry-auth", "--force", service])
            .await
    }

    pub async fn inspect(&self, service: &str) -> Result<Option<ServiceInspect>> {
        self.cli.inspect(&["service", "inspect", service]).await
    }

    pub async fn exists(&self, service: &str) -> Result<bool> {
        Ok(self
            .inspect(service)
            .await?
            .is_some_and(|inspect| !inspect.id.is_empty()))
    }

    pub fn create_args(spec: &ServiceCreateSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "service",
            "create",
            "--with-registry-auth",
            "--mount",
            LOCALTIME_MOUNT,
            "--name",
            spec.name.as_str(),
            "-d",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("--network={}", spec.network));

        if spec.node_role == GLOBAL_ROLE {
            args.push("--mode".to_string());
            args.push(GLOBAL_ROLE.to_string());
        } else {
            args.push("--replicas".to_string());
            args.push(spec.replicas.to_string());
            args.push("--constraint".to_string());
            args.push(format!("node.role=={}", spec.node_role));
        }

        if let Some(cpus) = spec.limit_cpus.filter(|cpus| *cpus > 0.0) {
            args.push(format!("--limit-cpu={}", cpus));
        }
        if let Some(memory) = spec.limit_memory.as_deref().filter(|m| !m.is_empty()) {
            args.push(format!("--limit-memory={}", memory));
        }

        args.extend(spec.args.iter().cloned());
        args.push(spec.image.clone());
        args
    }

    pub async fn create(&self, spec: &ServiceCreateSpec) -> Result<()> {
        tracing::info!("Creating service {} from {}", spec.name, spec.image);
        self.update(&Self::create_args(spec)).await
    }

    /// Last `tail` log lines with the `name.slot.task@node |` prefix removed
    pub async fn logs(&self, service: &str, tail: u32) -> Result<Vec<String>> {
        let tail = tail.to_string();
        let command = self
            .cli
            .command(&["service", "logs", service, "--tail", tail.as_str()])
            .combine_stderr(true)
            .build();
        let result = self.cli.check(command).await?;
        Ok(result.lines.iter().map(|line| strip_log_prefix(line)).collect())
    }

    pub async fn list(&self) -> Result<Vec<ServiceSummary>> {
        let command = self
            .cli
            .command(&["service", "ls", "--format", ServiceSummary::FORMAT])
            .build();
        let result = self.cli.check(command).await?;
        Ok(TableDecoder::piped(ServiceSummary::MIN_FIELDS)
            .decode(&result.lines, ServiceSummary::from_fields))
    }

    /// Tasks of a service; earlier tasks of the same slot are nested in `history`
    pub async fn ps(&self, service: &str) -> Result<Vec<ServiceTask>> {
        let command = self
            .cli
            .command(&["service", "ps", service, "--format", ServiceTask::FORMAT])
            .build();
        let result = self.cli.check(command).await?;
        Ok(TableDecoder::piped(ServiceTask::MIN_FIELDS).decode_grouped(
            &result.lines,
            ServiceTask::NAME_COLUMN,
            ServiceTask::from_fields,
            |parent, child| parent.history.push(child),
        ))
    }
}

/// Text after the first `|` of a multiplexed log line, trimmed
pub fn strip_log_prefix(line: &str) -> String {
    match line.split_once('|') {
        Some((_, message)) => message.trim().to_string(),
        None => line.to_string(),
    }
}
