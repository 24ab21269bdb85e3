//! Install orchestration.
//!
//! A [`Session`] carries the instance being installed or updated through the
//! pipeline explicitly; nothing is kept in process-wide state, so several
//! sessions can run side by side in one process.
//!
//! ```text
//! Session::resolve ──► Pipeline::install_resource ──► Pipeline::apply_redirector
//!   (match/allocate)     (fetch → extract → install)     (patch game executable)
//!                                                               │
//!                                            Pipeline::commit ◄─┘
//!                                            (persist + link)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::checksum::Digest;
use crate::config::AppPaths;
use crate::confirm::Confirm;
use crate::error::{Error, Result};
use crate::extract::{ArchiveExpander, ArchiveExtractor, ArchiveFormat, SystemExtractor};
use crate::fetch::{DownloadDescriptor, ResourceFetcher, Transport};
use crate::install::{InstallDescriptor, InstallOutcome, InstallationApplier};
use crate::redirector::{ApplyOutcome, Redirector};
use crate::state::{mark_conflict, Conflict, Instance, InvalidInstance, Launcher, LauncherIds, StateStore};

/// Everything needed to register an instance.
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    pub identity: String,
    pub install_path: PathBuf,
    pub launcher: Launcher,
    pub launcher_ids: LauncherIds,
    pub game_path: PathBuf,
    pub game_executable: String,
    pub script_extender: bool,
    pub plugins: Vec<String>,
}

impl InstanceRequest {
    fn build(self, index: u32) -> std::result::Result<Instance, InvalidInstance> {
        let mut builder = Instance::builder(index, self.identity, self.install_path)
            .launcher(self.launcher, self.launcher_ids)
            .game(self.game_path, self.game_executable)
            .script_extender(self.script_extender);
        for plugin in self.plugins {
            builder = builder.plugin(plugin);
        }
        builder.build()
    }
}

/// The instance a run is working on.
#[derive(Debug, Clone)]
pub struct Session {
    instance: Instance,
    is_new: bool,
    conflict: Option<Conflict>,
}

impl Session {
    /// Work on an already registered instance.
    pub fn for_instance(instance: Instance) -> Self {
        Self {
            instance,
            is_new: false,
            conflict: None,
        }
    }

    /// Find the instance for `request` or register a new one.
    ///
    /// An instance already installed at the requested path for the same game
    /// is reused. A path held by another game needs confirmation; accepting
    /// leaves a conflict marker in the directory.
    pub fn resolve(
        store: &mut StateStore,
        request: InstanceRequest,
        confirm: &dyn Confirm,
    ) -> Result<Self> {
        let report = store.find(
            Some(request.identity.as_str()),
            Some(request.install_path.as_path()),
            true,
        );

        if let Some(existing) = report
            .matches
            .iter()
            .find(|i| i.install_path() == request.install_path)
        {
            tracing::info!(index = existing.index(), identity = %existing.identity(), "Using existing instance");
            return Ok(Self::for_instance(existing.clone()));
        }

        let conflict = report.conflicts.into_iter().next();
        if let Some(conflict) = &conflict {
            let prompt = format!(
                "{} is already used by {}. Install {} there anyway?",
                request.install_path.display(),
                conflict.existing_identity,
                request.identity
            );
            if !confirm.confirm(&prompt, false) {
                return Err(Error::ConflictDeclined {
                    path: request.install_path,
                    existing: conflict.existing_identity.clone(),
                    requested: request.identity,
                });
            }
            mark_conflict(&request.install_path, conflict)?;
        }

        let index = store.allocate_index()?;
        let instance = request.build(index)?;
        tracing::info!(index, identity = %instance.identity(), path = %instance.install_path().display(), "Registering new instance");

        Ok(Self {
            instance,
            is_new: true,
            conflict,
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }

    pub fn into_instance(self) -> Instance {
        self.instance
    }

    /// Whether the instance was registered by this session.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        self.conflict.as_ref()
    }
}

/// A downloadable resource and how to install it into an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub filename: Option<String>,
    pub checksum: Option<Digest>,
    /// Top-level file that proves an archive was fully extracted.
    pub marker: Option<String>,
    /// Entries to copy out of the extracted tree; `None` copies everything.
    pub whitelist: Option<Vec<String>>,
    /// Destination relative to the instance directory.
    pub target: PathBuf,
    /// File compared between old and new payload before overwriting.
    pub probe: Option<String>,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            checksum: None,
            marker: None,
            whitelist: None,
            target: PathBuf::new(),
            probe: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<Digest>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_whitelist<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_probe(mut self, probe: impl Into<String>) -> Self {
        self.probe = Some(probe.into());
        self
    }
}

/// Archive name without its archive extension(s).
fn archive_stem(file_name: &str) -> &str {
    const SUFFIXES: [&str; 9] = [
        ".tar.gz", ".tar.xz", ".tar.bz2", ".tar.zst", ".tgz", ".txz", ".tar", ".zip", ".7z",
    ];
    SUFFIXES
        .iter()
        .find_map(|suffix| {
            let split = file_name.len().checked_sub(suffix.len())?;
            let tail = file_name.get(split..)?;
            tail.eq_ignore_ascii_case(suffix).then(|| &file_name[..split])
        })
        .unwrap_or(file_name)
}

fn is_populated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Shared machinery for running sessions.
pub struct Pipeline<'a, T: Transport, E: ArchiveExtractor = SystemExtractor> {
    fetcher: &'a ResourceFetcher<T>,
    expander: ArchiveExpander<E>,
    confirm: &'a dyn Confirm,
    paths: AppPaths,
}

impl<'a, T: Transport> Pipeline<'a, T, SystemExtractor> {
    pub fn new(fetcher: &'a ResourceFetcher<T>, confirm: &'a dyn Confirm, paths: AppPaths) -> Self {
        Self {
            fetcher,
            expander: ArchiveExpander::system(),
            confirm,
            paths,
        }
    }
}

impl<'a, T: Transport, E: ArchiveExtractor> Pipeline<'a, T, E> {
    /// Use a different archive extractor.
    pub fn with_expander<F: ArchiveExtractor>(self, expander: ArchiveExpander<F>) -> Pipeline<'a, T, F> {
        Pipeline {
            fetcher: self.fetcher,
            expander,
            confirm: self.confirm,
            paths: self.paths,
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Fetch, expand and install `resource` into the session's instance.
    ///
    /// A pinned instance with an installed target is skipped before anything
    /// is downloaded.
    pub fn install_resource(&self, session: &Session, resource: &Resource) -> Result<InstallOutcome> {
        let instance = session.instance();
        let destination = instance.install_path().join(&resource.target);

        if instance.is_pinned() && is_populated(&destination) {
            tracing::info!(index = instance.index(), url = %resource.url, "Instance is pinned; skipping update");
            return Ok(InstallOutcome::SkippedPinned);
        }

        let mut descriptor = DownloadDescriptor::new(&resource.url, self.paths.downloads_dir());
        descriptor.filename = resource.filename.clone();
        descriptor.expected_checksum = resource.checksum.clone();
        let archive = self.fetcher.fetch(&descriptor)?;

        let file_name = descriptor.file_name()?;
        let install = if ArchiveFormat::from_path(&archive).is_some() {
            let extracted = self.paths.extracted_dir().join(archive_stem(&file_name));
            let source = self
                .expander
                .extract(&archive, &extracted, resource.marker.as_deref())?;
            InstallDescriptor {
                source_dir: source,
                destination_dir: destination,
                whitelist: resource.whitelist.clone(),
            }
        } else {
            // plain files are copied as-is
            InstallDescriptor::new(self.paths.downloads_dir(), destination)
                .with_whitelist([file_name])
        };

        let outcome = InstallationApplier::new(self.confirm).install_payload(
            &install,
            instance.is_pinned(),
            resource.probe.as_deref(),
        )?;
        Ok(outcome)
    }

    /// Patch the game executable to launch this instance.
    ///
    /// Pinned instances keep whatever is installed, even an older redirector.
    pub fn apply_redirector(
        &self,
        session: &Session,
        redirector: &Redirector,
    ) -> Result<Option<ApplyOutcome>> {
        let instance = session.instance();
        let executable = instance.executable();

        if instance.is_pinned() {
            tracing::info!(index = instance.index(), executable = %executable.display(), "Instance is pinned; leaving redirector alone");
            return Ok(None);
        }

        let outcome = redirector.apply(&executable)?;
        redirector.write_path_entry(&executable, instance.install_path())?;
        Ok(Some(outcome))
    }

    /// Write the session's instance to the registry and refresh its link.
    pub fn commit(&self, store: &mut StateStore, session: &Session) -> Result<PathBuf> {
        store.persist(session.instance())?;
        let link = store.symlink(session.instance())?;
        tracing::info!(
            index = session.instance().index(),
            link = %link.display(),
            "Instance saved"
        );
        Ok(link)
    }
}
