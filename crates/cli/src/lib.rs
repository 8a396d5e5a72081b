//! Skillsmith CLI library
//!
//! Argument types, command implementations and output formatting for
//! the `skillsmith` binary. The binary itself only parses arguments and
//! dispatches here.

use skillsmith_core::Result;

pub mod commands;
pub mod logging;
pub mod output;

pub use commands::{CacheArgs, CacheCommand, IngestArgs, ProvidersArgs, WorkerArgs};
pub use logging::init_logging;
pub use output::{OutputFormat, OutputFormatter};

/// CLI version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base trait for CLI commands
#[allow(async_fn_in_trait)]
pub trait CliCommand {
    /// Execute the command, returning the process exit code
    async fn execute(&self) -> Result<i32>;

    /// Command name for logging
    fn name(&self) -> &'static str;
}

/// Common command execution wrapper
pub async fn execute_command<T: CliCommand>(command: T) -> i32 {
    tracing::debug!("Executing command: {}", command.name());
    match command.execute().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Command {} failed ({}): {}", command.name(), e.kind(), e);
            eprintln!("error [{}]: {}", e.kind(), e);
            1
        }
    }
}
