//! Command implementations.

pub mod raw;
pub mod tools;

use std::sync::Arc;

use kubestrap_core::{Config, Platform, ProvisioningContext};
use kubestrap_engine::{Engine, HttpDownloader, TracingSink};
use tracing::debug;

use crate::cli::{Cli, CliError, Commands, EXIT_OK, ToolsCommands};

/// Loaded configuration together with the engine built from it.
#[derive(Debug)]
pub struct App {
    /// Merged configuration documents
    pub config: Config,
    /// Engine over the configured catalog
    pub engine: Engine,
}

impl App {
    /// Load configuration for `cli` and build the engine.
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::load(&cli.config_locations())?;
        if let Some(root) = &cli.cache_root {
            config.cache_root = Some(root.clone());
        }
        Self::from_config(config)
    }

    /// Build the engine for an already loaded configuration.
    pub fn from_config(config: Config) -> Result<Self, CliError> {
        let catalog = config.catalog()?;
        let layout = config.layout();
        debug!(tools = catalog.len(), cache_root = %layout.root().display(), "Configuration loaded");

        let context = Arc::new(ProvisioningContext::new(layout, Platform::detect()?, catalog));
        let downloader = Arc::new(HttpDownloader::new()?);
        let engine = Engine::new(context, downloader, Arc::new(TracingSink));
        Ok(Self { config, engine })
    }
}

/// Dispatch the parsed command line; returns the process exit code.
pub async fn execute(cli: Cli) -> Result<i32, CliError> {
    let Some(command) = cli.command.as_ref() else {
        return Err(CliError::config_with_help(
            "no command given",
            "Run 'kubestrap --help' to list the available commands",
        ));
    };

    if matches!(command, Commands::Version) {
        return tools::print_version().map(|()| EXIT_OK);
    }

    let app = App::load(&cli)?;
    match command {
        Commands::Raw(args) => raw::execute(&app, args).await,
        Commands::Tools { subcommand } => match subcommand {
            ToolsCommands::List { json } => tools::list(&app, *json).map(|()| EXIT_OK),
            ToolsCommands::Ensure { tools, timeout } => {
                tools::ensure(&app, tools, *timeout).await.map(|()| EXIT_OK)
            }
            ToolsCommands::Path => tools::path(&app).map(|()| EXIT_OK),
        },
        Commands::Version => Ok(EXIT_OK),
    }
}
