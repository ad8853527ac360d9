//! # rmedia infra-common
//!
//! Shared infrastructure for the rmedia control plane crates:
//!
//! - [`errors`]: the infrastructure error type and context helpers
//! - [`logging`]: `tracing-subscriber` setup and structured log contexts
//! - [`config`]: server configuration loaded from files and the environment
//! - [`tasks`]: tracked task spawning with cooperative cancellation

pub mod config;
pub mod errors;
pub mod logging;
pub mod tasks;

pub use config::{DispatchConfig, ServerConfig};
pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{setup_logging, LogContext, LoggingConfig};
pub use tasks::{TaskHandle, TaskManager, TaskPriority, TaskStats};
