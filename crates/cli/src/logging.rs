//! Logging setup for the CLI
//!
//! Uses the tracing ecosystem with an `EnvFilter`; `SKILLSMITH_LOG`
//! overrides the level chosen by flags.

use skillsmith_core::{Result, SkillsmithError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the global subscriber
///
/// `verbose` lowers the default level to debug; `json` switches the
/// format for machine consumers.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env("SKILLSMITH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level))
        .add_directive("hyper=warn".parse().expect("static directive"))
        .add_directive("reqwest=warn".parse().expect("static directive"));

    let fmt_layer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| {
            SkillsmithError::pipeline(format!("failed to initialize logging: {}", e))
        })?;
    Ok(())
}

/// Initialize logging for tests, ignoring double-init errors
pub fn init_test_logging() {
    let _ = init_logging(false, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_test_logging();
        init_test_logging();
    }
}
