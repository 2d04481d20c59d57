use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::runner::{DEFAULT_KILL_GRACE, DEFAULT_SHELL};
use crate::subprocess::ProcessCommand;

pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command: ProcessCommand {
                command_line: command_line.into(),
                shell: DEFAULT_SHELL.to_string(),
                env: HashMap::new(),
                working_dir: None,
                combine_stderr: false,
                stdin: None,
                timeout: None,
                cancel: None,
                kill_grace: DEFAULT_KILL_GRACE,
            },
        }
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.command.shell = shell.to_string();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.command
                .env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn combine_stderr(mut self, combine: bool) -> Self {
        self.command.combine_stderr = combine;
        self
    }

    pub fn stdin(mut self, input: String) -> Self {
        self.command.stdin = Some(input);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.command.timeout = timeout;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.command.cancel = Some(token);
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.command.kill_grace = grace;
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}
