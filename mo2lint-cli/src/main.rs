//! mo2-lint - manage Mod Organizer 2 instances from the command line.

mod commands;
mod error;
mod logging;
mod prompt;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::uninstall::UninstallArgs;
use commands::Context;
use error::CliError;
use prompt::ConsolePrompt;

#[derive(Debug, Parser)]
#[command(name = "mo2-lint", version, about = "Manage Mod Organizer 2 instances")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List registered instances
    List {
        /// Only instances for this game (Nexus slug, e.g. skyrimspecialedition)
        #[arg(long)]
        game: Option<String>,

        /// Only instances installed under this directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Reinstall Mod Organizer 2 and the redirector for an instance
    Update {
        /// Instance directory
        dir: PathBuf,
    },

    /// Stop updates from touching an instance
    Pin {
        /// Instance directory
        dir: PathBuf,
    },

    /// Allow updates on a pinned instance again
    Unpin {
        /// Instance directory
        dir: PathBuf,
    },

    /// Remove instances and undo their game patch
    Uninstall {
        /// Uninstall instances for this game
        #[arg(long)]
        game: Option<String>,

        /// Uninstall the instance in this directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Keep the instance files and the patched game executable
        #[arg(long)]
        keep_payload: bool,
    },

    /// Restore a game executable replaced by the redirector
    Restore {
        /// Path of the game executable
        executable: PathBuf,
    },

    /// View or change settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli, ctx: &Context) -> Result<(), CliError> {
    match cli.command {
        Commands::List { game, dir } => commands::list::run(ctx, game, dir),
        Commands::Update { dir } => commands::update::run(ctx, &dir, &ConsolePrompt::new()),
        Commands::Pin { dir } => commands::pin::run(ctx, &dir, true),
        Commands::Unpin { dir } => commands::pin::run(ctx, &dir, false),
        Commands::Uninstall {
            game,
            dir,
            keep_payload,
        } => commands::uninstall::run(
            ctx,
            UninstallArgs {
                game,
                dir,
                keep_payload,
            },
            &ConsolePrompt::new(),
        ),
        Commands::Restore { executable } => commands::restore::run(&executable),
        Commands::Config(command) => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();
    let (ctx, config_error) = Context::load();
    let _log_guard = logging::init(cli.verbose, &ctx.paths.log_dir());

    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Using default configuration");
    }

    if let Err(e) = run(cli, &ctx) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_uninstall() {
        let cli = Cli::parse_from(["mo2-lint", "uninstall", "--game", "skyrimspecialedition", "--keep-payload"]);
        match cli.command {
            Commands::Uninstall {
                game,
                dir,
                keep_payload,
            } => {
                assert_eq!(game.as_deref(), Some("skyrimspecialedition"));
                assert!(dir.is_none());
                assert!(keep_payload);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_verbose_after_subcommand() {
        let cli = Cli::parse_from(["mo2-lint", "list", "-v"]);
        assert!(cli.verbose);
    }
}
