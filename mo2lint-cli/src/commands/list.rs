//! `list` command.

use std::path::PathBuf;

use super::{absolute, describe, Context};
use crate::error::CliError;

/// List registered instances, optionally filtered by game or directory.
///
/// A directory filter matches every instance installed beneath it.
pub fn run(ctx: &Context, game: Option<String>, dir: Option<PathBuf>) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let dir = dir.as_deref().map(absolute);
    let report = store.find(game.as_deref(), dir.as_deref(), false);

    if report.matches.is_empty() {
        println!("No instances found.");
    } else {
        println!("Instances");
        println!("=========");
        for instance in &report.matches {
            println!("  {}", describe(instance));
            if !instance.plugins().is_empty() {
                println!("      plugins: {}", instance.plugins().join(", "));
            }
        }
    }

    for conflict in &report.conflicts {
        println!(
            "  ! {} is installed for {}, not {}",
            conflict.install_path.display(),
            conflict.existing_identity,
            conflict.requested_identity
        );
    }

    Ok(())
}
