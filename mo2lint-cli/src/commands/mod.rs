//! CLI command implementations.

pub mod config;
pub mod list;
pub mod pin;
pub mod restore;
pub mod uninstall;
pub mod update;

use std::path::{Path, PathBuf};

use mo2lint::config::{AppPaths, ConfigError, ConfigFile};
use mo2lint::state::{Instance, StateStore};

use crate::error::CliError;

/// Settings shared by every command.
pub struct Context {
    pub config: ConfigFile,
    pub paths: AppPaths,
}

impl Context {
    /// Load the configuration, falling back to defaults if it is unreadable.
    ///
    /// The load error is returned alongside so it can be logged once logging
    /// is up.
    pub fn load() -> (Self, Option<ConfigError>) {
        let (config, error) = match ConfigFile::load() {
            Ok(config) => (config, None),
            Err(e) => (ConfigFile::default(), Some(e)),
        };
        let paths = AppPaths::from_config(&config);
        (Self { config, paths }, error)
    }

    pub fn open_store(&self) -> Result<StateStore, CliError> {
        Ok(StateStore::load(
            self.paths.registry_file(),
            self.paths.links_dir(),
        )?)
    }
}

/// Absolute form of a user-supplied directory.
pub fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// One-line summary of an instance.
pub fn describe(instance: &Instance) -> String {
    let mut line = format!(
        "[{}] {} at {} ({})",
        instance.index(),
        instance.identity(),
        instance.install_path().display(),
        instance.launcher()
    );
    if instance.is_pinned() {
        line.push_str(" [pinned]");
    }
    line
}
