/// Error code registry for dockhand
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 8000-8999: Decode errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_VALIDATION_FAILED: u16 = 1008;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_INTERRUPTED: u16 = 4006;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;

    // Decode errors (8000-8999)
    pub const DECODE_INVALID_JSON: u16 = 8001;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1002 => "Invalid TOML syntax in configuration",
        1005 => "Invalid value in configuration",
        1008 => "Configuration validation failed",

        // Execution errors
        4000 => "Generic execution error",
        4002 => "Command execution timeout",
        4003 => "Subprocess failed",
        4005 => "Command received signal",
        4006 => "Command execution interrupted",
        4007 => "Failed to spawn subprocess",

        // Decode errors
        8001 => "Invalid JSON in command output",

        // Other errors
        9000 => "Generic error",
        9004 => "Internal error",

        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_ranges() {
        assert!(ErrorCode::CONFIG_GENERIC >= 1000 && ErrorCode::CONFIG_GENERIC < 2000);
        assert!(ErrorCode::EXEC_GENERIC >= 4000 && ErrorCode::EXEC_GENERIC < 5000);
        assert!(ErrorCode::DECODE_INVALID_JSON >= 8000 && ErrorCode::DECODE_INVALID_JSON < 9000);
        assert!(ErrorCode::OTHER_GENERIC >= 9000 && ErrorCode::OTHER_GENERIC < 10000);
    }

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(describe_error_code(4005), "Command received signal");
        assert_eq!(describe_error_code(4002), "Command execution timeout");
        assert_eq!(describe_error_code(8001), "Invalid JSON in command output");
        assert_eq!(describe_error_code(65535), "Unknown error code");
    }
}
