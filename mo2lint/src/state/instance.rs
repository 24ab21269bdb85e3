//! Instance records.
//!
//! An [`Instance`] is validated when it is built or deserialized, so a record
//! held by the registry always has an identity, an install path, a game and
//! at least one launcher id.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInstance {
    #[error("instance is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("instance has no launcher id")]
    NoLauncherId,

    #[error("instance index must be positive")]
    ZeroIndex,
}

/// Game store the instance's game was installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Launcher {
    Steam,
    Gog,
    Epic,
}

impl Launcher {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Steam => "steam",
            Self::Gog => "gog",
            Self::Epic => "epic",
        }
    }
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Launcher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steam" => Ok(Self::Steam),
            "gog" => Ok(Self::Gog),
            "epic" => Ok(Self::Epic),
            _ => Err(format!("unknown launcher: {}", s)),
        }
    }
}

/// Store-specific ids of the game. Unknown ids are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherIds {
    #[serde(default, deserialize_with = "optional_id")]
    pub steam: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub gog: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub epic: Option<String>,
}

impl LauncherIds {
    pub fn get(&self, launcher: Launcher) -> Option<&str> {
        match launcher {
            Launcher::Steam => self.steam.as_deref(),
            Launcher::Gog => self.gog.as_deref(),
            Launcher::Epic => self.epic.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steam.is_none() && self.gog.is_none() && self.epic.is_none()
    }
}

/// Older documents store ids as numbers or as empty strings.
fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::Text(s)) if !s.trim().is_empty() => Some(s),
        Some(Repr::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One registered installation of Mod Organizer 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInstance")]
pub struct Instance {
    index: u32,
    #[serde(rename = "nexus_slug")]
    identity: String,
    #[serde(rename = "instance_path")]
    install_path: PathBuf,
    #[serde(rename = "pin")]
    pinned: bool,
    launcher: Launcher,
    launcher_ids: LauncherIds,
    game_path: PathBuf,
    game_executable: String,
    script_extender: bool,
    plugins: Vec<String>,
}

/// Unvalidated wire form of [`Instance`].
#[derive(Deserialize)]
struct RawInstance {
    index: u32,
    #[serde(rename = "nexus_slug", alias = "identity", default)]
    identity: String,
    #[serde(rename = "instance_path", default)]
    install_path: PathBuf,
    #[serde(rename = "pin", default)]
    pinned: bool,
    launcher: Launcher,
    #[serde(default)]
    launcher_ids: LauncherIds,
    #[serde(default)]
    game_path: PathBuf,
    #[serde(default)]
    game_executable: String,
    #[serde(default)]
    script_extender: bool,
    #[serde(default)]
    plugins: Vec<String>,
}

impl TryFrom<RawInstance> for Instance {
    type Error = InvalidInstance;

    fn try_from(raw: RawInstance) -> Result<Self, Self::Error> {
        let mut builder = Instance::builder(raw.index, raw.identity, raw.install_path)
            .launcher(raw.launcher, raw.launcher_ids)
            .game(raw.game_path, raw.game_executable)
            .pinned(raw.pinned)
            .script_extender(raw.script_extender);
        for plugin in raw.plugins {
            builder = builder.plugin(plugin);
        }
        builder.build()
    }
}

impl Instance {
    /// Start building an instance with its key fields.
    pub fn builder(
        index: u32,
        identity: impl Into<String>,
        install_path: impl Into<PathBuf>,
    ) -> InstanceBuilder {
        InstanceBuilder {
            index,
            identity: identity.into(),
            install_path: install_path.into(),
            launcher: None,
            launcher_ids: LauncherIds::default(),
            game_path: PathBuf::new(),
            game_executable: String::new(),
            pinned: false,
            script_extender: false,
            plugins: Vec::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Nexus game slug the instance manages, e.g. `skyrimspecialedition`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn launcher(&self) -> Launcher {
        self.launcher
    }

    pub fn launcher_ids(&self) -> &LauncherIds {
        &self.launcher_ids
    }

    /// Game installation directory.
    pub fn game_path(&self) -> &Path {
        &self.game_path
    }

    pub fn game_executable(&self) -> &str {
        &self.game_executable
    }

    /// Full path of the game executable the redirector replaces.
    pub fn executable(&self) -> PathBuf {
        self.game_path.join(&self.game_executable)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn script_extender(&self) -> bool {
        self.script_extender
    }

    pub fn set_script_extender(&mut self, enabled: bool) {
        self.script_extender = enabled;
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Add a plugin, keeping insertion order. Returns false if present.
    pub fn add_plugin(&mut self, plugin: impl Into<String>) -> bool {
        let plugin = plugin.into();
        if self.plugins.contains(&plugin) {
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    pub fn remove_plugin(&mut self, plugin: &str) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|p| p != plugin);
        self.plugins.len() != before
    }
}

/// Builder for [`Instance`]; [`build`](Self::build) validates.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    index: u32,
    identity: String,
    install_path: PathBuf,
    launcher: Option<Launcher>,
    launcher_ids: LauncherIds,
    game_path: PathBuf,
    game_executable: String,
    pinned: bool,
    script_extender: bool,
    plugins: Vec<String>,
}

impl InstanceBuilder {
    pub fn launcher(mut self, launcher: Launcher, ids: LauncherIds) -> Self {
        self.launcher = Some(launcher);
        self.launcher_ids = ids;
        self
    }

    pub fn game(mut self, game_path: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        self.game_path = game_path.into();
        self.game_executable = executable.into();
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn script_extender(mut self, enabled: bool) -> Self {
        self.script_extender = enabled;
        self
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        let plugin = plugin.into();
        if !self.plugins.contains(&plugin) {
            self.plugins.push(plugin);
        }
        self
    }

    pub fn build(self) -> Result<Instance, InvalidInstance> {
        if self.index == 0 {
            return Err(InvalidInstance::ZeroIndex);
        }
        if self.identity.trim().is_empty() {
            return Err(InvalidInstance::MissingField("nexus_slug"));
        }
        if self.install_path.as_os_str().is_empty() {
            return Err(InvalidInstance::MissingField("instance_path"));
        }
        let launcher = self
            .launcher
            .ok_or(InvalidInstance::MissingField("launcher"))?;
        if self.launcher_ids.is_empty() {
            return Err(InvalidInstance::NoLauncherId);
        }
        if self.game_path.as_os_str().is_empty() {
            return Err(InvalidInstance::MissingField("game_path"));
        }
        if self.game_executable.trim().is_empty() {
            return Err(InvalidInstance::MissingField("game_executable"));
        }

        Ok(Instance {
            index: self.index,
            identity: self.identity,
            install_path: self.install_path,
            pinned: self.pinned,
            launcher,
            launcher_ids: self.launcher_ids,
            game_path: self.game_path,
            game_executable: self.game_executable,
            script_extender: self.script_extender,
            plugins: self.plugins,
        })
    }
}
