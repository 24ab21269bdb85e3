//! `restore` command.

use std::path::Path;

use console::style;
use mo2lint::redirector::{self, RestoreOutcome};

use super::absolute;
use crate::error::CliError;

/// Put the original game executable back from its backup.
pub fn run(executable: &Path) -> Result<(), CliError> {
    let executable = absolute(executable);

    match redirector::restore(&executable)? {
        RestoreOutcome::Restored { backup } => {
            println!("Restored {}", executable.display());
            println!("  from {}", backup.display());
        }
        outcome @ RestoreOutcome::BackupMissing { .. } => {
            println!(
                "{} {}",
                style("Warning:").yellow().bold(),
                outcome.guidance().unwrap_or_default()
            );
        }
    }

    Ok(())
}
