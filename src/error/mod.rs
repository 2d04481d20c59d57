use std::fmt::Display;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

use crate::docker::DecodeError;
use crate::subprocess::ProcessError;

/// The unified error type for dockhand operations
#[derive(Error, Debug)]
pub enum DockhandError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Decode error: {message}")]
    Decode {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DockhandError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create an execution error with default code
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            code: ErrorCode::EXEC_GENERIC,
            message: message.into(),
            command: None,
            exit_code: None,
            source: None,
        }
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            exit_code: None,
            source: None,
        }
    }

    pub fn decode(code: u16, message: impl Into<String>) -> Self {
        Self::Decode {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Decode { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Execution { message, .. }
            | Self::Decode { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", context, message);
            }
        }
        self
    }

    /// Set the exit code for an execution error
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        if let Self::Execution {
            exit_code: ref mut ec,
            ..
        } = self
        {
            *ec = Some(exit_code);
        }
        self
    }

    /// Get the process exit code the binary should end with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Execution { .. } => 5,
            Self::Decode { .. } => 8,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Execution { code, .. }
            | Self::Decode { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Exit code reported by the external tool, when there was one
    pub fn tool_exit_code(&self) -> Option<i32> {
        match self {
            Self::Execution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Execution {
                message, command, ..
            } => {
                if let Some(cmd) = command {
                    format!("Command '{}' failed: {}", cmd, message)
                } else {
                    format!("Execution error: {}", message)
                }
            }
            Self::Decode { message, .. } => format!("Unreadable docker output: {}", message),
            Self::Other { message, .. } => message.clone(),
        }
    }
}

/// Type alias for Results using DockhandError
pub type Result<T> = std::result::Result<T, DockhandError>;

/// Type alias for application Results (using anyhow for flexibility)
pub type AppResult<T> = anyhow::Result<T>;

impl From<ProcessError> for DockhandError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::CommandFailed {
                command,
                exit_code,
                output,
            } => DockhandError::execution_with_code(
                ErrorCode::EXEC_SUBPROCESS_FAILED,
                output,
                Some(command),
            )
            .with_exit_code(exit_code),
            ProcessError::Signaled {
                command,
                signal,
                output,
            } => DockhandError::execution_with_code(
                ErrorCode::EXEC_SIGNAL_RECEIVED,
                output,
                Some(command),
            )
            .with_exit_code(128 + signal),
            ProcessError::SpawnFailed { command, message } => {
                DockhandError::execution_with_code(ErrorCode::EXEC_SPAWN_FAILED, message, Some(command))
            }
            ProcessError::Timeout(duration) => DockhandError::execution_with_code(
                ErrorCode::EXEC_TIMEOUT,
                format!("timed out after {:?}", duration),
                None,
            ),
            ProcessError::Cancelled(command) => DockhandError::execution_with_code(
                ErrorCode::EXEC_INTERRUPTED,
                "cancelled",
                Some(command),
            ),
            ProcessError::InternalError { message } => Self::Other {
                code: ErrorCode::OTHER_INTERNAL_ERROR,
                message,
                source: None,
            },
            other @ ProcessError::MockExpectationNotMet(_) => {
                DockhandError::execution(other.to_string())
            }
        }
    }
}

impl From<DecodeError> for DockhandError {
    fn from(err: DecodeError) -> Self {
        DockhandError::decode(ErrorCode::DECODE_INVALID_JSON, err.to_string()).with_source(err)
    }
}

impl From<toml::de::Error> for DockhandError {
    fn from(err: toml::de::Error) -> Self {
        DockhandError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}

impl From<serde_json::Error> for DockhandError {
    fn from(err: serde_json::Error) -> Self {
        DockhandError::decode(ErrorCode::DECODE_INVALID_JSON, "Invalid JSON").with_source(err)
    }
}
