use std::sync::Arc;

use super::inspect::{first_record, is_not_found, InspectRecord, NOT_FOUND_SENTINELS};
use crate::config::DockhandConfig;
use crate::error::Result;
use crate::subprocess::{
    ExecutionResult, ExitStatus, ProcessCommand, ProcessCommandBuilder, ProcessError,
    ProcessRunner, RunningProcess, SubprocessManager,
};

/// Builds docker command lines and runs them through the configured runner
#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn ProcessRunner>,
    config: Arc<DockhandConfig>,
}

impl DockerCli {
    pub fn new(subprocess: &SubprocessManager, config: DockhandConfig) -> Self {
        Self {
            runner: subprocess.runner(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DockhandConfig {
        &self.config
    }

    /// Quoted binary followed by quoted arguments
    pub fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        let binary = shell_words::quote(&self.config.docker_binary);
        if args.is_empty() {
            return binary.into_owned();
        }
        format!("{} {}", binary, shell_words::join(args))
    }

    /// Binary name for hand-written shell pipelines
    pub fn binary(&self) -> String {
        shell_words::quote(&self.config.docker_binary).into_owned()
    }

    fn base(&self, command_line: String) -> ProcessCommandBuilder {
        ProcessCommandBuilder::new(command_line)
            .shell(&self.config.shell)
            .kill_grace(self.config.kill_grace())
    }

    /// A bounded command; the configured timeout applies
    pub fn command<S: AsRef<str>>(&self, args: &[S]) -> ProcessCommandBuilder {
        self.base(self.command_line(args))
            .timeout_opt(self.config.command_timeout())
    }

    /// A command that may run for as long as its caller wants
    pub fn streaming<S: AsRef<str>>(&self, args: &[S]) -> ProcessCommandBuilder {
        self.base(self.command_line(args))
    }

    /// A full shell command line, already quoted
    pub fn shell_line(&self, command_line: String) -> ProcessCommandBuilder {
        self.base(command_line)
            .timeout_opt(self.config.command_timeout())
    }

    pub fn spawn(&self, command: ProcessCommand) -> RunningProcess {
        self.runner.spawn(command)
    }

    pub async fn run(&self, command: ProcessCommand) -> ExecutionResult {
        self.runner.run(command).await
    }

    /// Run and fail on anything but exit code 0, keeping the output in the error
    pub async fn check(
        &self,
        command: ProcessCommand,
    ) -> std::result::Result<ExecutionResult, ProcessError> {
        self.run(command).await.into_checked()
    }

    /// Run and fail only when the tool never produced a verdict of its own
    pub async fn query(
        &self,
        command: ProcessCommand,
    ) -> std::result::Result<ExecutionResult, ProcessError> {
        let result = self.run(command).await;
        match result.status {
            ExitStatus::SpawnFailed
            | ExitStatus::Cancelled
            | ExitStatus::Timeout
            | ExitStatus::Lost => result.into_checked(),
            _ => Ok(result),
        }
    }

    /// Run an inspect-style command and decode its first record
    pub async fn inspect<T, S>(&self, args: &[S]) -> Result<Option<T>>
    where
        T: InspectRecord,
        S: AsRef<str>,
    {
        let result = self
            .query(self.command(args).combine_stderr(true).build())
            .await?;
        let raw = result.text();

        if is_not_found(&raw, NOT_FOUND_SENTINELS) {
            return Ok(None);
        }
        result.into_checked()?;

        Ok(first_record(&raw, NOT_FOUND_SENTINELS)?)
    }
}
