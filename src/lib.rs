//! # Dockhand
//!
//! Drives a Docker swarm through the `docker` CLI and turns its text and JSON
//! output into typed records.
//!
//! ## Usage
//!
//! ```bash
//! dockhand service ls
//! dockhand container stats web.1
//! dockhand events --type container
//! ```
//!
//! ## Modules
//!
//! - `app` - Command line settings, logging setup and fatal error reporting
//! - `config` - Layered configuration (defaults, TOML files, environment)
//! - `docker` - Container, service, node, image and registry operations plus output decoders
//! - `error` - Unified error type with stable error codes
//! - `subprocess` - Process runner with streaming output, cancellation and a mock for tests
pub mod app;
pub mod config;
pub mod docker;
pub mod error;
pub mod subprocess;

pub use config::DockhandConfig;
pub use docker::DockerClient;
pub use error::{DockhandError, ErrorCode};
