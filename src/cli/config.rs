//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{BatchConfig, ExecutionProvider},
    models::ModelKind,
};
use anyhow::{Context, Result};

/// Everything a run needs that comes from the command line
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunSettings {
    pub(crate) config: BatchConfig,
    pub(crate) model: ModelKind,
}

/// Convert CLI arguments to the library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the batch configuration and model selection from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<RunSettings> {
        let model: ModelKind = cli.model.parse().context("Invalid model")?;

        let execution_provider: ExecutionProvider = cli
            .execution_provider
            .parse()
            .context("Invalid execution provider")?;

        let config = BatchConfig::builder()
            .max_concurrency(cli.workers)
            .execution_provider(execution_provider)
            .intra_threads(cli.threads)
            .model_dir(cli.model_dir.clone())
            .auto_download(!cli.no_download)
            .build()
            .context("Invalid configuration")?;

        Ok(RunSettings { config, model })
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        cli.execution_provider
            .parse::<ExecutionProvider>()
            .context("Invalid execution provider")?;

        cli.model.parse::<ModelKind>().context("Invalid model")?;

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{}'", pattern))?;
        }

        if let Some(output) = &cli.output {
            if output.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    output.display()
                );
            }
        }

        Ok(())
    }
}
