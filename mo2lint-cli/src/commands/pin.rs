//! `pin` and `unpin` commands.

use std::path::Path;

use mo2lint::state::StateError;

use super::{absolute, describe, Context};
use crate::error::CliError;

/// Pin or unpin the instance installed exactly at `dir`.
///
/// Pinned instances are skipped by updates and keep their redirector.
pub fn run(ctx: &Context, dir: &Path, pinned: bool) -> Result<(), CliError> {
    let dir = absolute(dir);
    let mut store = ctx.open_store()?;

    let instance = match store.set_pinned(&dir, pinned) {
        Ok(instance) => instance,
        Err(StateError::NotFound(path)) => {
            return Err(CliError::NoMatch(format!(
                "No instance is installed at {}. Use 'mo2-lint list' to see instances.",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let verb = if pinned { "Pinned" } else { "Unpinned" };
    println!("{} {}", verb, describe(&instance));
    Ok(())
}
