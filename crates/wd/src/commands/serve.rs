//! `wd serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use wd_config::{CliSettings, Config};
use wd_server::{run_server, server_config_from_wd_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directory to serve (overrides config).
    dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover wd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long, env = "WD_HOST")]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long, env = "WD_PORT")]
    port: Option<u16>,

    /// Path of the WebSocket reload endpoint (overrides config).
    #[arg(long)]
    reload_path: Option<String>,

    /// Reload every open page on any change.
    #[arg(long)]
    force_reload: bool,

    /// Make the injected client connect with wss:// (for use behind a TLS proxy).
    #[arg(long)]
    tls: bool,

    /// Enable verbose output (log every request and change).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// CLI settings that override the configuration file.
    ///
    /// Boolean switches only override when given.
    pub(crate) fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            source_dir: self.dir.clone(),
            reload_path: self.reload_path.clone(),
            force_reload: self.force_reload.then_some(true),
            tls: self.tls.then_some(true),
        }
    }

    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;

        output.highlight(&format!(
            "Serving http://{}:{}/",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "Source directory: {}",
            config.mirror_resolved.source_dir.display()
        ));
        output.info(&format!("Reload endpoint: {}", config.live_reload.path));
        if config.live_reload.force_reload {
            output.info("Force reload: enabled");
        }
        if config.live_reload.tls {
            output.warning("TLS: clients will connect with wss://, terminate TLS in front of wd");
        }

        let server_config = server_config_from_wd_config(&config);
        run_server(server_config).await?;

        output.info("Server stopped");
        Ok(())
    }
}
