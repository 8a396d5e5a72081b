//! `skillsmith providers` - report backend availability

use crate::output::{OutputFormat, OutputFormatter, ProviderRow};
use crate::CliCommand;
use clap::Args;
use skillsmith_core::providers::ProviderRegistry;
use skillsmith_core::{Result, SkillsmithConfig};
use std::path::PathBuf;

/// Arguments for the providers command
#[derive(Debug, Clone, Args)]
pub struct ProvidersArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

impl CliCommand for ProvidersArgs {
    async fn execute(&self) -> Result<i32> {
        let config = SkillsmithConfig::load(self.config.as_deref())?;
        let registry = ProviderRegistry::new(config.provider_options.clone());

        let mut rows = Vec::new();
        for name in ProviderRegistry::known_providers() {
            let provider = registry.resolve(name)?;
            let (available, reason) = match provider.probe().await {
                Ok(()) => (true, String::new()),
                Err(e) => (false, e.to_string()),
            };
            rows.push(ProviderRow {
                name: (*name).to_string(),
                available,
                reason,
            });
        }

        OutputFormatter::new(self.format).providers(&rows)?;
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "providers"
    }
}
