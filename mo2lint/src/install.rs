//! Copying extracted resources into place.
//!
//! [`install`] copies a directory tree, or a whitelisted subset of it, into a
//! destination. [`InstallationApplier`] adds the pin and overwrite policy on
//! top of it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::checksum::{self, ChecksumError};
use crate::confirm::Confirm;

/// Whitelist entry that selects the whole tree.
pub const WILDCARD: &str = "*";

/// Errors raised while installing files.
#[derive(Debug, Error)]
pub enum InstallError {
    /// A whitelisted path is absent from the source.
    #[error("{entry} not found in {}", .source_dir.display())]
    MissingFile { source_dir: PathBuf, entry: String },

    /// The source directory does not exist.
    #[error("install source does not exist: {}", .path.display())]
    SourceMissing { path: PathBuf },

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// What to copy and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDescriptor {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    /// Relative paths to copy. `None`, empty or `["*"]` copies everything.
    pub whitelist: Option<Vec<String>>,
}

impl InstallDescriptor {
    pub fn new(source_dir: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            whitelist: None,
        }
    }

    pub fn with_whitelist<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the whitelist selects the whole tree.
    pub fn copies_everything(&self) -> bool {
        match &self.whitelist {
            None => true,
            Some(entries) => entries.is_empty() || entries.iter().all(|e| e == WILDCARD),
        }
    }
}

/// Copy files from `source` into `destination`.
///
/// Without a whitelist the whole tree is merged into `destination`. With one,
/// each listed path is copied to `destination/<file name>`. Every listed path
/// is checked before anything is copied.
///
/// Returns the top-level paths written.
pub fn install(
    source: &Path,
    destination: &Path,
    whitelist: Option<&[String]>,
) -> Result<Vec<PathBuf>, InstallError> {
    let descriptor = InstallDescriptor {
        source_dir: source.to_path_buf(),
        destination_dir: destination.to_path_buf(),
        whitelist: whitelist.map(<[String]>::to_vec),
    };
    install_descriptor(&descriptor)
}

/// [`install`] for a prepared [`InstallDescriptor`].
pub fn install_descriptor(descriptor: &InstallDescriptor) -> Result<Vec<PathBuf>, InstallError> {
    let source = descriptor.source_dir.as_path();
    let destination = descriptor.destination_dir.as_path();

    if !source.is_dir() {
        return Err(InstallError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    if descriptor.copies_everything() {
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "Copying full tree"
        );
        copy_dir_recursive(source, destination)?;
        return Ok(vec![destination.to_path_buf()]);
    }

    let entries = descriptor.whitelist.as_deref().unwrap_or_default();
    let mut selected = Vec::with_capacity(entries.len());
    for entry in entries.iter().filter(|e| e.as_str() != WILDCARD) {
        let path = source.join(entry);
        let name = match path.file_name() {
            Some(name) if stays_inside(entry) && path.exists() => name.to_owned(),
            _ => {
                return Err(InstallError::MissingFile {
                    source_dir: source.to_path_buf(),
                    entry: entry.clone(),
                })
            }
        };
        selected.push((path, destination.join(name)));
    }

    create_dir_all(destination)?;
    let mut written = Vec::with_capacity(selected.len());
    for (from, to) in selected {
        tracing::trace!(from = %from.display(), to = %to.display(), "Installing entry");
        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|source| InstallError::Write {
                path: to.clone(),
                source,
            })?;
        }
        written.push(to);
    }

    Ok(written)
}

/// Whether a whitelist entry is a plain relative path that cannot leave the
/// source directory.
fn stays_inside(entry: &str) -> bool {
    Path::new(entry)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Recursively copy a directory, merging into an existing destination.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), InstallError> {
    create_dir_all(dest)?;

    let read_err = |source_err| InstallError::Read {
        path: source.to_path_buf(),
        source: source_err,
    };

    for entry in fs::read_dir(source).map_err(read_err)? {
        let entry = entry.map_err(|e| InstallError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_dir_recursive(&source_path, &dest_path)?;
        } else {
            fs::copy(&source_path, &dest_path).map_err(|e| InstallError::Write {
                path: dest_path,
                source: e,
            })?;
        }
    }

    Ok(())
}

fn create_dir_all(path: &Path) -> Result<(), InstallError> {
    fs::create_dir_all(path).map_err(|source| InstallError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Result of a policy-checked install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Files were copied; holds the top-level paths written.
    Installed(Vec<PathBuf>),
    /// The destination is pinned and already populated.
    SkippedPinned,
    /// The installed payload already matches the source.
    UpToDate,
    /// The user declined to overwrite a differing payload.
    Declined,
}

/// Installs payloads while honoring pins and asking before overwrites.
pub struct InstallationApplier<'c> {
    confirm: &'c dyn Confirm,
}

impl<'c> InstallationApplier<'c> {
    pub fn new(confirm: &'c dyn Confirm) -> Self {
        Self { confirm }
    }

    /// Install `descriptor` into a possibly existing payload.
    ///
    /// `probe` names a file, relative to both source and destination, whose
    /// checksum decides whether the installed payload differs from the new
    /// one. A pinned, populated destination is never touched.
    pub fn install_payload(
        &self,
        descriptor: &InstallDescriptor,
        pinned: bool,
        probe: Option<&str>,
    ) -> Result<InstallOutcome, InstallError> {
        let destination = &descriptor.destination_dir;
        let populated = fs::read_dir(destination)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        if populated && pinned {
            tracing::info!(destination = %destination.display(), "Payload is pinned; skipping");
            return Ok(InstallOutcome::SkippedPinned);
        }

        if let Some(probe) = probe {
            let installed = destination.join(probe);
            let incoming = descriptor.source_dir.join(probe);
            if populated && installed.is_file() && incoming.is_file() {
                if checksum::matches(&installed, &incoming)? {
                    tracing::debug!(path = %installed.display(), "Installed payload is current");
                    return Ok(InstallOutcome::UpToDate);
                }

                let prompt = format!(
                    "{} differs from the new version. Overwrite it?",
                    installed.display()
                );
                if !self.confirm.confirm(&prompt, false) {
                    tracing::info!(path = %installed.display(), "Overwrite declined");
                    return Ok(InstallOutcome::Declined);
                }
            }
        }

        install_descriptor(descriptor).map(InstallOutcome::Installed)
    }
}
