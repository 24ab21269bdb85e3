//! Per-index convenience links.
//!
//! Every instance gets `<config>/instances/<index>` pointing at its install
//! directory. Only symlinks are ever replaced or removed here; a real file or
//! directory at a link path is left alone.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use super::StateError;

/// Location of the link for `index`.
pub fn link_path(links_dir: &Path, index: u32) -> PathBuf {
    links_dir.join(index.to_string())
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
    move |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create or refresh the link for `index` pointing at `target`.
///
/// A correct link is kept, a stale link is replaced, and anything that is
/// not a symlink makes this fail with [`StateError::LinkOccupied`].
pub fn create_instance_link(
    links_dir: &Path,
    index: u32,
    target: &Path,
) -> Result<PathBuf, StateError> {
    fs::create_dir_all(links_dir).map_err(io_err(links_dir))?;
    let link = link_path(links_dir, index);

    if link.symlink_metadata().is_ok() {
        if !is_symlink(&link) {
            tracing::warn!(path = %link.display(), "Not a symlink; leaving it in place");
            return Err(StateError::LinkOccupied { path: link });
        }

        if fs::read_link(&link).map_err(io_err(&link))? == target {
            return Ok(link);
        }

        tracing::debug!(path = %link.display(), "Replacing stale instance link");
        fs::remove_file(&link).map_err(io_err(&link))?;
    }

    symlink(target, &link).map_err(io_err(&link))?;
    tracing::debug!(link = %link.display(), target = %target.display(), "Created instance link");
    Ok(link)
}

/// Remove the link for `index` if it points at `target`. Returns whether a
/// link was removed.
pub fn remove_instance_link(links_dir: &Path, index: u32, target: &Path) -> Result<bool, StateError> {
    let link = link_path(links_dir, index);

    if is_symlink(&link) {
        if fs::read_link(&link).map_err(io_err(&link))? != target {
            tracing::warn!(path = %link.display(), "Link points elsewhere; leaving it in place");
            return Ok(false);
        }
        fs::remove_file(&link).map_err(io_err(&link))?;
        tracing::debug!(path = %link.display(), "Removed instance link");
        return Ok(true);
    }

    if link.exists() {
        tracing::warn!(path = %link.display(), "Not a symlink; leaving it in place");
    }
    Ok(false)
}
