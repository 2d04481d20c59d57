//! Error handling utilities

use tracing::error;

use crate::error::DockhandError;

/// Exit code for errors that are not a [`DockhandError`]
pub const GENERAL_ERROR: i32 = 1;

/// Print an error for the user and pick the process exit code.
///
/// With `verbose >= 1` the full source chain is printed as well.
pub fn report_error(error: &anyhow::Error, verbose: u8) -> i32 {
    error!("Fatal error: {}", error);

    let exit_code = if let Some(dockhand_err) = error.downcast_ref::<DockhandError>() {
        eprintln!("{}", dockhand_err.user_message());
        dockhand_err.exit_code()
    } else {
        eprintln!("Error: {error}");
        GENERAL_ERROR
    };

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    exit_code
}

/// Handle fatal errors and exit with appropriate status code
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    std::process::exit(report_error(&error, verbose))
}
