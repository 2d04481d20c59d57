use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::buffer::LineBuffer;
use super::error::ProcessError;

/// The process could not be started; nothing ran.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;
/// The run was cancelled through its token and the process group was terminated.
pub const CANCELLED_EXIT_CODE: i32 = -2;
/// The run exceeded its timeout and the process group was terminated.
pub const TIMEOUT_EXIT_CODE: i32 = -3;
/// The supervising task went away without reporting an exit status.
pub const LOST_EXIT_CODE: i32 = -4;

pub const DEFAULT_SHELL: &str = "sh";
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    /// Fully formed command line, already quoted by the caller
    pub command_line: String,
    pub shell: String,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Merge stderr into the same line channel as stdout
    pub combine_stderr: bool,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    /// Time between SIGTERM and SIGKILL when terminating the process group
    pub kill_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
    Timeout,
    Cancelled,
    SpawnFailed,
    Lost,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Integer exit code: 0, the tool's own code, `128 + signal`, or a negative sentinel
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Error(code) => *code,
            ExitStatus::Signal(signal) => 128 + signal,
            ExitStatus::Timeout => TIMEOUT_EXIT_CODE,
            ExitStatus::Cancelled => CANCELLED_EXIT_CODE,
            ExitStatus::SpawnFailed => SPAWN_FAILED_EXIT_CODE,
            ExitStatus::Lost => LOST_EXIT_CODE,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Success,
            SPAWN_FAILED_EXIT_CODE => ExitStatus::SpawnFailed,
            CANCELLED_EXIT_CODE => ExitStatus::Cancelled,
            TIMEOUT_EXIT_CODE => ExitStatus::Timeout,
            LOST_EXIT_CODE => ExitStatus::Lost,
            code => ExitStatus::Error(code),
        }
    }
}

/// Final report of one invocation, published once the process is gone and its output flushed
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub status: ExitStatus,
    /// Stderr lines, only populated when stderr was not merged into the line channel
    pub stderr: Vec<String>,
    pub duration: Duration,
}

impl ProcessExit {
    pub fn new(status: ExitStatus) -> Self {
        Self {
            status,
            stderr: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn code(&self) -> i32 {
        self.status.code()
    }
}

/// Cloneable handle that resolves to the exit report of one invocation.
///
/// Every clone and every call observes the same report.
#[derive(Debug, Clone)]
pub struct WaitHandle {
    rx: watch::Receiver<Option<ProcessExit>>,
}

impl WaitHandle {
    pub(crate) fn channel() -> (watch::Sender<Option<ProcessExit>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// A handle for an invocation that has already finished
    pub fn completed(exit: ProcessExit) -> Self {
        let (_, rx) = watch::channel(Some(exit));
        Self { rx }
    }

    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.rx.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(exit) => (*exit).clone(),
            Err(_) => None,
        };
        exit.unwrap_or_else(|| ProcessExit::new(ExitStatus::Lost))
    }

    pub async fn code(&self) -> i32 {
        self.wait().await.code()
    }

    /// The report if the invocation has already finished
    pub fn try_exit(&self) -> Option<ProcessExit> {
        self.rx.borrow().clone()
    }
}

/// One live invocation: its output lines and its exit handle
pub struct RunningProcess {
    pub command: String,
    pub output: LineBuffer,
    pub exit: WaitHandle,
}

impl RunningProcess {
    /// Drain all output, then wait for the exit report
    pub async fn collect(mut self) -> ExecutionResult {
        self.output.fill().await;
        let exit = self.exit.wait().await;
        ExecutionResult {
            command: self.command,
            lines: self.output.into_lines(),
            stderr: exit.stderr,
            status: exit.status,
            duration: exit.duration,
        }
    }

    pub fn into_parts(self) -> (LineBuffer, WaitHandle) {
        (self.output, self.exit)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: String,
    pub lines: Vec<String>,
    pub stderr: Vec<String>,
    pub status: ExitStatus,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> i32 {
        self.status.code()
    }

    /// Captured lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Everything the tool printed, stdout lines first, for diagnostics
    pub fn diagnostic_output(&self) -> String {
        self.lines
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Turn a non-successful run into an error carrying the captured output verbatim
    pub fn into_checked(self) -> Result<Self, ProcessError> {
        match &self.status {
            ExitStatus::Success => Ok(self),
            ExitStatus::SpawnFailed => Err(ProcessError::SpawnFailed {
                message: self.diagnostic_output(),
                command: self.command,
            }),
            ExitStatus::Cancelled => Err(ProcessError::Cancelled(self.command)),
            ExitStatus::Timeout => Err(ProcessError::Timeout(self.duration)),
            ExitStatus::Signal(signal) => Err(ProcessError::Signaled {
                signal: *signal,
                output: self.diagnostic_output(),
                command: self.command,
            }),
            _ => Err(ProcessError::CommandFailed {
                exit_code: self.exit_code(),
                output: self.diagnostic_output(),
                command: self.command,
            }),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Start the command and return immediately; output arrives while it runs
    fn spawn(&self, command: ProcessCommand) -> RunningProcess;

    /// Run to completion and collect everything
    async fn run(&self, command: ProcessCommand) -> ExecutionResult {
        self.spawn(command).collect().await
    }
}

enum LineSink {
    Channel(mpsc::UnboundedSender<String>),
    Capture(Vec<String>),
}

impl LineSink {
    fn push(&mut self, line: String) {
        match self {
            // A dropped receiver means nobody wants the lines; keep draining the pipe anyway
            LineSink::Channel(tx) => {
                let _ = tx.send(line);
            }
            LineSink::Capture(lines) => lines.push(line),
        }
    }

    fn into_captured(self) -> Vec<String> {
        match self {
            LineSink::Channel(_) => Vec::new(),
            LineSink::Capture(lines) => lines,
        }
    }
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Normalize a line by removing trailing newlines
    fn normalize_line(mut line: String) -> String {
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        line
    }

    /// Copy one pipe into a sink, line by line, as bytes arrive
    async fn pump_lines<R>(reader: R, mut sink: LineSink, source: &'static str) -> Vec<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = Self::normalize_line(String::from_utf8_lossy(&buf).into_owned());
                    tracing::trace!("[{}] {}", source, line);
                    sink.push(line);
                }
                Err(e) => {
                    tracing::warn!("Failed reading {} of subprocess: {}", source, e);
                    break;
                }
            }
        }
        sink.into_captured()
    }

    /// Log command execution details
    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!(
            "Executing subprocess: {} -c {}",
            command.shell,
            command.command_line
        );

        if !command.env.is_empty() {
            tracing::debug!("Environment overrides: {}", command.env.len());
            tracing::trace!(
                "Environment override keys: {:?}",
                command.env.keys().collect::<Vec<_>>()
            );
        }

        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        if let Some(ref stdin) = command.stdin {
            tracing::trace!("Stdin provided: {} bytes", stdin.len());
        }
    }

    /// Configure the command with environment, working directory and pipes
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.shell);

        // Own process group so termination reaches everything the shell started
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.arg("-c").arg(&command.command_line);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        let message = if error.kind() == std::io::ErrorKind::NotFound {
            format!("shell '{}' not found", command.shell)
        } else {
            error.to_string()
        };
        ProcessError::SpawnFailed {
            command: command.command_line.clone(),
            message,
        }
    }

    fn spawn_child(command: &ProcessCommand) -> Result<Child, ProcessError> {
        if command.command_line.trim().is_empty() {
            return Err(ProcessError::SpawnFailed {
                command: String::new(),
                message: "empty command line".to_string(),
            });
        }

        Self::configure_command(command).spawn().map_err(|e| {
            tracing::error!(
                "Failed to spawn '{}': {:?} (kind: {:?})",
                command.command_line,
                e,
                e.kind()
            );
            Self::map_spawn_error(e, command)
        })
    }

    /// Extract a stream from a child process, converting None to error
    fn extract_stream<T>(stream: Option<T>, stream_name: &str) -> Result<T, ProcessError> {
        stream.ok_or_else(|| ProcessError::InternalError {
            message: format!("Failed to capture {}", stream_name),
        })
    }

    /// Write stdin data to the child process, then close it
    async fn write_stdin(child: &mut Child, stdin_data: &str) {
        use tokio::io::AsyncWriteExt;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(stdin_data.as_bytes()).await {
                tracing::warn!("Failed to write stdin: {}", e);
                return;
            }
            if let Err(e) = stdin.shutdown().await {
                tracing::warn!("Failed to close stdin: {}", e);
            }
        }
    }

    /// Convert process exit status to our ExitStatus enum
    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    /// Parse signal status on Unix systems
    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            ExitStatus::Signal(signal)
        } else {
            ExitStatus::Error(1)
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    /// Send `signal` to the whole process group led by `pid`
    #[cfg(unix)]
    fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
        if let Some(pid) = pid {
            // Negative PID addresses the whole process group
            let pgid = nix::unistd::Pid::from_raw(-(pid as i32));
            if let Err(e) = nix::sys::signal::kill(pgid, signal) {
                tracing::trace!("Could not send {} to process group {}: {}", signal, pid, e);
            }
        }
    }

    /// SIGTERM the process group, then SIGKILL it if still alive after `grace`
    async fn terminate(child: &mut Child, grace: Duration) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            let pid = child.id();
            Self::signal_group(pid, Signal::SIGTERM);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }

            if let Some(pid) = pid {
                tracing::warn!(
                    "Process group {} still alive after {:?}, sending SIGKILL",
                    pid,
                    grace
                );
            }
            Self::signal_group(pid, Signal::SIGKILL);
        }

        let _ = child.kill().await;
    }

    async fn wait_for_exit(child: &mut Child, command: &ProcessCommand) -> ExitStatus {
        let cancel = command.cancel.clone().unwrap_or_default();
        let timeout = command.timeout;
        let deadline = async move {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => Self::parse_exit_status(status),
                Err(e) => {
                    tracing::error!("Failed to wait for '{}': {}", command.command_line, e);
                    ExitStatus::Lost
                }
            },
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelling subprocess: {}", command.command_line);
                Self::terminate(child, command.kill_grace).await;
                ExitStatus::Cancelled
            }
            _ = deadline => {
                Self::terminate(child, command.kill_grace).await;
                ExitStatus::Timeout
            }
        }
    }

    /// Wait for a pump task; after a forced termination the wait is bounded
    async fn join_pump(task: JoinHandle<Vec<String>>, bound: Option<Duration>) -> Vec<String> {
        let abort = task.abort_handle();
        let joined = match bound {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Output pipe still open {:?} after termination", limit);
                    abort.abort();
                    return Vec::new();
                }
            },
            None => task.await,
        };
        joined.unwrap_or_default()
    }

    /// Drain both pumps after the shell exited on its own.
    ///
    /// Background members of the process group can keep the pipes open past the
    /// shell's exit, so cancellation is still honoured here: the group is
    /// signalled and the drain is bounded by the kill grace.
    async fn drain_after_exit(
        pid: Option<u32>,
        status: ExitStatus,
        stdout_task: JoinHandle<Vec<String>>,
        stderr_task: JoinHandle<Vec<String>>,
        command: &ProcessCommand,
    ) -> (ExitStatus, Vec<String>) {
        let aborts = [stdout_task.abort_handle(), stderr_task.abort_handle()];
        let cancel = command.cancel.clone().unwrap_or_default();
        let grace = command.kill_grace;

        let drain = async {
            Self::join_pump(stdout_task, None).await;
            Self::join_pump(stderr_task, None).await
        };
        tokio::pin!(drain);

        tokio::select! {
            lines = &mut drain => (status, lines),
            _ = cancel.cancelled() => {
                tracing::debug!(
                    "Cancelling leftover process group: {}",
                    command.command_line
                );
                #[cfg(unix)]
                Self::signal_group(pid, nix::sys::signal::Signal::SIGTERM);
                if let Ok(lines) = tokio::time::timeout(grace, &mut drain).await {
                    return (ExitStatus::Cancelled, lines);
                }

                #[cfg(unix)]
                Self::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
                match tokio::time::timeout(grace, &mut drain).await {
                    Ok(lines) => (ExitStatus::Cancelled, lines),
                    Err(_) => {
                        tracing::warn!("Output pipe still open {:?} after SIGKILL", grace);
                        aborts.iter().for_each(|abort| abort.abort());
                        (ExitStatus::Cancelled, Vec::new())
                    }
                }
            }
        }
    }

    /// Log the exit of one invocation
    fn log_exit(exit: &ProcessExit, command: &ProcessCommand) {
        match &exit.status {
            ExitStatus::Success => {
                tracing::debug!(
                    "Subprocess completed successfully in {:?}: {}",
                    exit.duration,
                    command.command_line
                );
            }
            ExitStatus::Error(code) => {
                tracing::debug!(
                    "Subprocess failed with exit code {} in {:?}: {}",
                    code,
                    exit.duration,
                    command.command_line
                );
                if !exit.stderr.is_empty() {
                    tracing::trace!("Stderr: {}", exit.stderr.join("\n"));
                }
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "Subprocess terminated by signal {} in {:?}: {}",
                    signal,
                    exit.duration,
                    command.command_line
                );
            }
            ExitStatus::Timeout => {
                tracing::warn!(
                    "Subprocess timed out after {:?}: {}",
                    exit.duration,
                    command.command_line
                );
            }
            ExitStatus::Cancelled => {
                tracing::debug!(
                    "Subprocess cancelled after {:?}: {}",
                    exit.duration,
                    command.command_line
                );
            }
            ExitStatus::SpawnFailed | ExitStatus::Lost => {
                tracing::warn!(
                    "Subprocess ended without an exit status: {}",
                    command.command_line
                );
            }
        }
    }

    /// Own the child for its whole life: pump output, honour cancellation, publish the exit
    async fn supervise(
        mut child: Child,
        command: ProcessCommand,
        line_tx: mpsc::UnboundedSender<String>,
        exit_tx: watch::Sender<Option<ProcessExit>>,
    ) {
        let start = Instant::now();

        let stdout = Self::extract_stream(child.stdout.take(), "stdout");
        let stderr = Self::extract_stream(child.stderr.take(), "stderr");
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(e), _) | (_, Err(e)) => {
                let _ = line_tx.send(e.to_string());
                Self::terminate(&mut child, command.kill_grace).await;
                drop(line_tx);
                let _ = exit_tx.send(Some(ProcessExit::new(ExitStatus::SpawnFailed)));
                return;
            }
        };

        let stdout_task = tokio::spawn(Self::pump_lines(
            stdout,
            LineSink::Channel(line_tx.clone()),
            "stdout",
        ));
        let stderr_sink = if command.combine_stderr {
            LineSink::Channel(line_tx.clone())
        } else {
            LineSink::Capture(Vec::new())
        };
        let stderr_task = tokio::spawn(Self::pump_lines(stderr, stderr_sink, "stderr"));

        if let Some(stdin_data) = &command.stdin {
            Self::write_stdin(&mut child, stdin_data).await;
        }

        // Reaping the shell clears the pid, the group still needs it afterwards
        let pid = child.id();
        let status = Self::wait_for_exit(&mut child, &command).await;
        let (status, stderr_lines) = match status {
            ExitStatus::Cancelled | ExitStatus::Timeout => {
                let bound = Some(command.kill_grace);
                Self::join_pump(stdout_task, bound).await;
                (status, Self::join_pump(stderr_task, bound).await)
            }
            status => {
                Self::drain_after_exit(pid, status, stdout_task, stderr_task, &command).await
            }
        };

        // Channel closes only now: the process is gone and every line has been sent
        drop(line_tx);

        let exit = ProcessExit {
            status,
            stderr: stderr_lines,
            duration: start.elapsed(),
        };
        Self::log_exit(&exit, &command);
        let _ = exit_tx.send(Some(exit));
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    /// Must be called from within a tokio runtime
    fn spawn(&self, command: ProcessCommand) -> RunningProcess {
        Self::log_command_start(&command);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit) = WaitHandle::channel();
        let display = command.command_line.clone();

        match Self::spawn_child(&command) {
            Ok(child) => {
                tokio::spawn(Self::supervise(child, command, line_tx, exit_tx));
            }
            Err(e) => {
                let _ = line_tx.send(e.to_string());
                drop(line_tx);
                let _ = exit_tx.send(Some(ProcessExit::new(ExitStatus::SpawnFailed)));
            }
        }

        RunningProcess {
            command: display,
            output: LineBuffer::new(line_rx),
            exit,
        }
    }
}
