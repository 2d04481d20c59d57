use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Command '{command}' exited with code {exit_code}:\n{output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Command '{command}' was killed by signal {signal}:\n{output}")]
    Signaled {
        command: String,
        signal: i32,
        output: String,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process was cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl ProcessError {
    /// Exit code carried by the error, if the process got far enough to report one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::CommandFailed { exit_code, .. } => Some(*exit_code),
            ProcessError::Signaled { signal, .. } => Some(128 + signal),
            _ => None,
        }
    }

    /// Captured tool output, verbatim
    pub fn output(&self) -> Option<&str> {
        match self {
            ProcessError::CommandFailed { output, .. }
            | ProcessError::Signaled { output, .. } => Some(output),
            _ => None,
        }
    }
}
