//! wd CLI - live-reloading web development server.
//!
//! Provides commands for:
//! - `serve`: Serve a directory and reload browsers on change
//! - `version`: Print the version

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ServeArgs;
use error::CliError;
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// wd - web development server with live reload.
#[derive(Parser)]
#[command(name = "wd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory, reloading browsers when files change.
    Serve(ServeArgs),
    /// Print version information.
    Version,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Serve(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Version => {
            commands::version::execute(&output, VERSION);
            Ok(())
        }
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn serve(args: ServeArgs) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(args.execute())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "wd",
            "serve",
            "site",
            "--port",
            "9000",
            "--reload-path",
            "/_reload",
            "--force-reload",
            "--verbose",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(args.verbose);
        let settings = args.cli_settings();
        assert_eq!(settings.port, Some(9000));
        assert_eq!(settings.reload_path.as_deref(), Some("/_reload"));
        assert_eq!(settings.force_reload, Some(true));
        assert_eq!(settings.tls, None);
        assert_eq!(settings.source_dir, Some("site".into()));
    }

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["wd", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }
}
