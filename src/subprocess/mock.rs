use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::buffer::LineBuffer;
use super::error::ProcessError;
use super::runner::{
    ExitStatus, ProcessCommand, ProcessExit, ProcessRunner, RunningProcess, WaitHandle,
};

#[derive(Clone)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    description: String,
    #[allow(clippy::type_complexity)]
    matcher: Box<dyn Fn(&str) -> bool + Send + Sync>,
    lines: Vec<String>,
    stderr: Vec<String>,
    exit_code: i32,
    hold_until_cancelled: bool,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Expect a command line starting with `prefix`
    pub fn expect_command(&mut self, prefix: &str) -> MockCommandConfig {
        let owned = prefix.to_string();
        self.expect_matching(prefix, move |line| line.starts_with(&owned))
    }

    pub fn expect_matching<F>(&mut self, description: &str, matcher: F) -> MockCommandConfig
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                description: description.to_string(),
                matcher: Box::new(matcher),
                lines: Vec::new(),
                stderr: Vec::new(),
                exit_code: 0,
                hold_until_cancelled: false,
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, prefix: &str, times: usize) -> bool {
        let history = locked(&self.call_history);
        let count = history
            .iter()
            .filter(|cmd| cmd.command_line.starts_with(prefix))
            .count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        locked(&self.call_history).clone()
    }

    /// Command lines in call order
    pub fn command_lines(&self) -> Vec<String> {
        locked(&self.call_history)
            .iter()
            .map(|cmd| cmd.command_line.clone())
            .collect()
    }

    pub fn reset(&mut self) {
        locked(&self.expectations).clear();
        locked(&self.call_history).clear();
    }

    fn respond(&self, command: &ProcessCommand) -> Result<MockResponse, ProcessError> {
        let mut expectations = locked(&self.expectations);

        for expectation in expectations.iter_mut() {
            if !(expectation.matcher)(&command.command_line) {
                continue;
            }

            expectation.times_called += 1;

            if let Some(expected) = expectation.expected_times {
                if expectation.times_called > expected {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "Command '{}' called {} times, expected {}",
                        expectation.description, expectation.times_called, expected
                    )));
                }
            }

            return Ok(MockResponse {
                lines: expectation.lines.clone(),
                stderr: expectation.stderr.clone(),
                exit_code: expectation.exit_code,
                hold_until_cancelled: expectation.hold_until_cancelled,
            });
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {}",
            command.command_line
        )))
    }
}

struct MockResponse {
    lines: Vec<String>,
    stderr: Vec<String>,
    exit_code: i32,
    hold_until_cancelled: bool,
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    fn spawn(&self, command: ProcessCommand) -> RunningProcess {
        locked(&self.call_history).push(command.clone());

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let display = command.command_line.clone();

        let response = match self.respond(&command) {
            Ok(response) => response,
            Err(e) => {
                let _ = line_tx.send(e.to_string());
                return RunningProcess {
                    command: display,
                    output: LineBuffer::new(line_rx),
                    exit: WaitHandle::completed(ProcessExit::new(ExitStatus::SpawnFailed)),
                };
            }
        };

        for line in response.lines {
            let _ = line_tx.send(line);
        }
        let stderr = if command.combine_stderr {
            for line in response.stderr {
                let _ = line_tx.send(line);
            }
            Vec::new()
        } else {
            response.stderr
        };

        let exit = ProcessExit {
            status: ExitStatus::from_code(response.exit_code),
            stderr,
            duration: Duration::from_millis(10),
        };

        if response.hold_until_cancelled {
            let (exit_tx, handle) = WaitHandle::channel();
            let cancel = command.cancel.clone().unwrap_or_default();
            tokio::spawn(async move {
                cancel.cancelled().await;
                drop(line_tx);
                let _ = exit_tx.send(Some(ProcessExit {
                    status: ExitStatus::Cancelled,
                    ..exit
                }));
            });
            return RunningProcess {
                command: display,
                output: LineBuffer::new(line_rx),
                exit: handle,
            };
        }

        RunningProcess {
            command: display,
            output: LineBuffer::new(line_rx),
            exit: WaitHandle::completed(exit),
        }
    }
}

impl MockCommandConfig {
    pub fn returns_lines(mut self, lines: &[&str]) -> Self {
        self.expectation.lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Canned stdout given as one block of text
    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.lines = stdout.lines().map(str::to_string).collect();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.stderr = stderr.lines().map(str::to_string).collect();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.exit_code = code;
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.expectation.exit_code = 0;
        self
    }

    /// Keep the invocation running after its lines until the command's token is cancelled
    pub fn streams_until_cancelled(mut self) -> Self {
        self.expectation.hold_until_cancelled = true;
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        locked(&self.runner.expectations).push(self.expectation);
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}
