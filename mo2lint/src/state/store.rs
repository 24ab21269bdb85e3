//! The instance registry document and its store.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::Instance;
use super::symlink;
use super::trash::{self, Trash};
use super::StateError;
use crate::confirm::{Confirm, RemovalChoice};
use crate::fetch::{CredentialProvider, NexusError};
use crate::redirector::{self, RestoreOutcome};

/// Marker file placed in a directory that two instances claim.
pub const CONFLICT_MARKER: &str = ".conflict";

/// Nexus Mods API record kept in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusCredentials {
    pub uuid: Uuid,
    #[serde(default)]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl NexusCredentials {
    /// A fresh record for a new SSO handshake.
    pub fn generate() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            connection_token: None,
            api_key: None,
        }
    }
}

impl CredentialProvider for NexusCredentials {
    fn api_key(&self) -> Result<String, NexusError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                NexusError::MissingCredentials("no API key stored in the registry".to_string())
            })
    }
}

/// The on-disk registry document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Bumped on every successful write.
    #[serde(default)]
    pub revision: u64,
    /// Highest index ever issued.
    #[serde(default)]
    pub last_index: u32,
    #[serde(default)]
    pub nexus_api: Option<NexusCredentials>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Deserialize)]
struct RevisionProbe {
    #[serde(default)]
    revision: u64,
}

/// An instance whose install path matched a query made for another identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub index: u32,
    pub existing_identity: String,
    pub requested_identity: String,
    pub install_path: PathBuf,
}

/// Result of [`StateStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub matches: Vec<Instance>,
    pub conflicts: Vec<Conflict>,
}

impl MatchReport {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The only match, if there is exactly one.
    pub fn single(&self) -> Option<&Instance> {
        match self.matches.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Part of an instance to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The convenience link under the links directory.
    Symlink,
    /// The install directory, plus the redirector on the game executable.
    Payload,
    /// The registry record.
    State,
}

impl Component {
    pub const ALL: [Component; 3] = [Self::Symlink, Self::Payload, Self::State];
}

/// What [`StateStore::remove`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub symlink_removed: bool,
    /// How the install directory was handled, if it was considered.
    pub payload: Option<RemovalChoice>,
    /// Redirector restore result, if one was attempted.
    pub restore: Option<RestoreOutcome>,
    pub state_removed: bool,
}

/// Durable registry of instances.
///
/// Mutations stay in memory until [`save`](Self::save) or
/// [`persist`](Self::persist). Writes fail with
/// [`StateError::ConcurrentModification`] if another process wrote the
/// document since it was loaded.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    links_dir: PathBuf,
    trash: Option<Trash>,
    registry: Registry,
    loaded_revision: u64,
}

impl StateStore {
    /// Load the registry at `path`. A missing file yields an empty registry.
    pub fn load(path: impl Into<PathBuf>, links_dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let registry = read_registry(&path)?.unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            instances = registry.instances.len(),
            revision = registry.revision,
            "Loaded instance registry"
        );

        Ok(Self {
            path,
            links_dir: links_dir.into(),
            trash: Trash::user(),
            loaded_revision: registry.revision,
            registry,
        })
    }

    /// Use a specific trash directory instead of the user's.
    pub fn with_trash(mut self, trash: Trash) -> Self {
        self.trash = Some(trash);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn links_dir(&self) -> &Path {
        &self.links_dir
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn instances(&self) -> &[Instance] {
        &self.registry.instances
    }

    pub fn get(&self, index: u32) -> Option<&Instance> {
        self.registry.instances.iter().find(|i| i.index() == index)
    }

    /// Instances matching `identity` and `path`.
    ///
    /// Every filter that is given must match; with neither, every instance
    /// matches. With `exact`, a path matches only itself; otherwise any
    /// install path under `path` matches. An instance whose path matches but
    /// whose identity differs from a given `identity` is reported in
    /// [`MatchReport::conflicts`], not as a match.
    pub fn find(&self, identity: Option<&str>, path: Option<&Path>, exact: bool) -> MatchReport {
        let mut report = MatchReport::default();

        for instance in &self.registry.instances {
            let path_match = path.is_some_and(|p| {
                if exact {
                    instance.install_path() == p
                } else {
                    instance.install_path().starts_with(p)
                }
            });
            if path.is_some() && !path_match {
                continue;
            }

            match identity {
                Some(id) if instance.identity() != id => {
                    if path_match {
                        report.conflicts.push(Conflict {
                            index: instance.index(),
                            existing_identity: instance.identity().to_string(),
                            requested_identity: id.to_string(),
                            install_path: instance.install_path().to_path_buf(),
                        });
                    }
                }
                _ => report.matches.push(instance.clone()),
            }
        }

        for conflict in &report.conflicts {
            tracing::warn!(
                index = conflict.index,
                existing = %conflict.existing_identity,
                requested = %conflict.requested_identity,
                path = %conflict.install_path.display(),
                "Install path already belongs to another game"
            );
        }

        report
    }

    /// Issue a new index. Indices are never reused, even after removal.
    pub fn allocate_index(&mut self) -> Result<u32, StateError> {
        let highest = self
            .registry
            .instances
            .iter()
            .map(Instance::index)
            .max()
            .unwrap_or(0)
            .max(self.registry.last_index);
        let next = highest
            .checked_add(1)
            .ok_or(StateError::IndexExhausted(highest))?;
        self.registry.last_index = next;
        tracing::debug!(index = next, "Allocated instance index");
        Ok(next)
    }

    /// Remove parts of the instance at `index`.
    ///
    /// `State` only changes the in-memory registry; call [`save`](Self::save)
    /// to write it.
    pub fn remove(
        &mut self,
        index: u32,
        components: &[Component],
        confirm: &dyn Confirm,
    ) -> Result<RemovalReport, StateError> {
        let instance = self
            .get(index)
            .cloned()
            .ok_or(StateError::UnknownIndex(index))?;
        let mut report = RemovalReport::default();

        if components.contains(&Component::Symlink) {
            report.symlink_removed =
                symlink::remove_instance_link(&self.links_dir, index, instance.install_path())?;
        }

        if components.contains(&Component::Payload) {
            report.payload = Some(self.remove_payload(&instance, confirm)?);
            report.restore = self.restore_executable(&instance, confirm)?;
        }

        if components.contains(&Component::State) {
            self.registry.instances.retain(|i| i.index() != index);
            report.state_removed = true;
            tracing::info!(index, identity = %instance.identity(), "Removed instance from registry");
        }

        Ok(report)
    }

    fn remove_payload(
        &self,
        instance: &Instance,
        confirm: &dyn Confirm,
    ) -> Result<RemovalChoice, StateError> {
        let dir = instance.install_path();
        if !dir.exists() {
            tracing::debug!(path = %dir.display(), "Install directory already gone");
            return Ok(RemovalChoice::Keep);
        }

        let choice = confirm.removal(&format!("Remove {}?", dir.display()));
        let io_err = |source| StateError::Io {
            path: dir.to_path_buf(),
            source,
        };
        match choice {
            RemovalChoice::Trash => {
                let trash = self.trash.as_ref().ok_or(StateError::NoTrash)?;
                trash.put(dir).map_err(io_err)?;
            }
            RemovalChoice::Delete => trash::delete_permanently(dir).map_err(io_err)?,
            RemovalChoice::Keep => {
                tracing::info!(path = %dir.display(), "Keeping install directory")
            }
        }
        Ok(choice)
    }

    fn restore_executable(
        &self,
        instance: &Instance,
        confirm: &dyn Confirm,
    ) -> Result<Option<RestoreOutcome>, StateError> {
        let executable = instance.executable();
        if !redirector::is_patched(&executable) {
            return Ok(None);
        }

        let sharing = self
            .registry
            .instances
            .iter()
            .filter(|i| i.index() != instance.index() && i.executable() == executable)
            .count();
        if sharing > 0 {
            let prompt = format!(
                "{} other instance(s) use {}. Restore the original executable anyway?",
                sharing,
                executable.display()
            );
            if !confirm.confirm(&prompt, false) {
                return Ok(None);
            }
        }

        Ok(Some(redirector::restore(&executable)?))
    }

    /// Insert or replace `instance` by index and write the registry.
    pub fn persist(&mut self, instance: &Instance) -> Result<(), StateError> {
        match self
            .registry
            .instances
            .iter_mut()
            .find(|i| i.index() == instance.index())
        {
            Some(existing) => *existing = instance.clone(),
            None => self.registry.instances.push(instance.clone()),
        }
        self.registry.last_index = self.registry.last_index.max(instance.index());
        self.save()
    }

    /// Write the registry back to disk.
    pub fn save(&mut self) -> Result<(), StateError> {
        let on_disk = read_revision(&self.path)?;
        if on_disk != self.loaded_revision {
            return Err(StateError::ConcurrentModification {
                path: self.path.clone(),
                expected: self.loaded_revision,
                found: on_disk,
            });
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.registry.revision = self.loaded_revision + 1;
        let json = serde_json::to_string_pretty(&self.registry)
            .map_err(|e| StateError::Serialize(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.loaded_revision = self.registry.revision;
        tracing::debug!(path = %self.path.display(), revision = self.registry.revision, "Saved instance registry");
        Ok(())
    }

    /// Pin or unpin the instance installed exactly at `path`.
    pub fn set_pinned(&mut self, path: &Path, pinned: bool) -> Result<Instance, StateError> {
        let report = self.find(None, Some(path), true);
        let mut instance = match report.matches.len() {
            0 => return Err(StateError::NotFound(path.to_path_buf())),
            1 => report.matches[0].clone(),
            count => {
                return Err(StateError::Ambiguous {
                    path: path.to_path_buf(),
                    count,
                })
            }
        };

        instance.set_pinned(pinned);
        self.persist(&instance)?;
        tracing::info!(index = instance.index(), pinned, "Updated pin");
        Ok(instance)
    }

    /// Create or refresh the convenience link for `instance`.
    pub fn symlink(&self, instance: &Instance) -> Result<PathBuf, StateError> {
        symlink::create_instance_link(&self.links_dir, instance.index(), instance.install_path())
    }

    pub fn credentials(&self) -> Option<&NexusCredentials> {
        self.registry.nexus_api.as_ref()
    }

    /// Replace the stored Nexus credentials. Call [`save`](Self::save) to
    /// write them.
    pub fn set_credentials(&mut self, credentials: Option<NexusCredentials>) {
        self.registry.nexus_api = credentials;
    }
}

/// Parse the registry at `path`, or `None` if there is no file.
fn read_registry(path: &Path) -> Result<Option<Registry>, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let registry: Registry =
        serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut seen = HashSet::new();
    if let Some(duplicate) = registry
        .instances
        .iter()
        .map(Instance::index)
        .find(|index| !seen.insert(*index))
    {
        return Err(StateError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("index {} is used by more than one instance", duplicate),
        });
    }

    Ok(Some(registry))
}

fn read_revision(path: &Path) -> Result<u64, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str::<RevisionProbe>(&content)
        .map(|probe| probe.revision)
        .map_err(|e| StateError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Drop a [`CONFLICT_MARKER`] into `dir` naming the identities involved.
pub fn mark_conflict(dir: &Path, conflict: &Conflict) -> Result<PathBuf, StateError> {
    fs::create_dir_all(dir).map_err(|source| StateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let marker = dir.join(CONFLICT_MARKER);
    let body = format!(
        "index={}\nexisting={}\nrequested={}\n",
        conflict.index, conflict.existing_identity, conflict.requested_identity
    );
    fs::write(&marker, body).map_err(|source| StateError::Io {
        path: marker.clone(),
        source,
    })?;
    tracing::warn!(path = %marker.display(), "Marked install path conflict");
    Ok(marker)
}

/// Whether `dir` carries a conflict marker.
pub fn has_conflict_marker(dir: &Path) -> bool {
    dir.join(CONFLICT_MARKER).is_file()
}
