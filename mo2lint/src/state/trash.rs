//! Moving directories into the user's trash.
//!
//! Implements the freedesktop.org trash layout: the item goes into
//! `Trash/files/` and a matching `Trash/info/<name>.trashinfo` records where
//! it came from, so file managers can restore it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::install::copy_dir_recursive;

/// A freedesktop trash directory.
#[derive(Debug, Clone)]
pub struct Trash {
    root: PathBuf,
}

impl Trash {
    /// The current user's home trash (`$XDG_DATA_HOME/Trash`).
    pub fn user() -> Option<Self> {
        dirs::data_dir().map(|d| Self::at(d.join("Trash")))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.root.join("info")
    }

    /// Move `path` into the trash. Returns its new location.
    pub fn put(&self, path: &Path) -> io::Result<PathBuf> {
        let original = path.canonicalize()?;
        let name = original
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cannot trash a root path"))?
            .to_string_lossy()
            .into_owned();

        fs::create_dir_all(self.files_dir())?;
        fs::create_dir_all(self.info_dir())?;

        let (trashed, info) = self.free_slot(&name);
        let deleted_at = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S");
        fs::write(
            &info,
            format!(
                "[Trash Info]\nPath={}\nDeletionDate={}\n",
                original.display(),
                deleted_at
            ),
        )?;

        if let Err(e) = move_path(&original, &trashed) {
            let _ = fs::remove_file(&info);
            return Err(e);
        }

        tracing::info!(from = %original.display(), to = %trashed.display(), "Moved to trash");
        Ok(trashed)
    }

    /// First unused `files/` name for `name`, with its info file.
    fn free_slot(&self, name: &str) -> (PathBuf, PathBuf) {
        let mut candidate = name.to_string();
        let mut n = 1;
        loop {
            let trashed = self.files_dir().join(&candidate);
            let info = self.info_dir().join(format!("{}.trashinfo", candidate));
            if trashed.symlink_metadata().is_err() && !info.exists() {
                return (trashed, info);
            }
            n += 1;
            candidate = format!("{}.{}", name, n);
        }
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    if from.is_dir() {
        copy_dir_recursive(from, to).map_err(io::Error::other)?;
        fs::remove_dir_all(from)
    } else {
        fs::copy(from, to)?;
        fs::remove_file(from)
    }
}

/// Remove a file or directory permanently.
pub fn delete_permanently(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    tracing::info!(path = %path.display(), "Deleted");
    Ok(())
}
