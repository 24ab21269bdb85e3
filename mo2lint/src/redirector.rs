//! Reversible executable patching.
//!
//! The redirector is a small executable placed over the game's launcher
//! executable. It reads `modorganizer2/instance_path.txt` next to the game
//! and starts that Mod Organizer 2 instance instead of the game.
//!
//! # Lifecycle
//!
//! ```text
//! Unpatched ──apply──► Patched(backup) ──restore──► Unpatched
//! ```
//!
//! The original executable is kept as a backup next to it. The backup is
//! created once and never overwritten, so repeated applies cannot lose the
//! original.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::checksum::{self, ChecksumError};

/// Directory next to the game executable holding redirector data.
pub const DATA_DIR: &str = "modorganizer2";

/// File inside [`DATA_DIR`] naming the instance to launch.
pub const PATH_ENTRY: &str = "instance_path.txt";

/// Executable the path entry points at, relative to the instance directory.
pub const INSTANCE_EXECUTABLE: &str = "ModOrganizer.exe";

/// Guidance shown when a patched executable cannot be restored.
pub const BACKUP_MISSING_GUIDANCE: &str =
    "No backup found; verify the game files through your game launcher to restore the original executable";

/// Errors raised while patching or restoring an executable.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("redirector payload not found: {}", .path.display())]
    PayloadMissing { path: PathBuf },

    #[error("game executable not found: {}", .path.display())]
    ExecutableMissing { path: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PatchError + '_ {
    move |source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Where the backup of a patched executable lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupNaming {
    /// `Game.exe` → `Game.exe.bak`
    #[default]
    Suffix,
    /// `Game.exe` → `Game.bak.exe`, for games whose launcher requires the
    /// original extension on every executable it finds.
    PreserveExtension,
}

impl BackupNaming {
    pub fn backup_path(&self, executable: &Path) -> PathBuf {
        match self {
            Self::Suffix => {
                let mut name = executable.as_os_str().to_owned();
                name.push(".bak");
                PathBuf::from(name)
            }
            Self::PreserveExtension => {
                let stem = executable
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = match executable.extension() {
                    Some(ext) => format!("{}.bak.{}", stem, ext.to_string_lossy()),
                    None => format!("{}.bak", stem),
                };
                executable.with_file_name(name)
            }
        }
    }
}

/// Result of [`Redirector::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The executable already matched the payload.
    AlreadyApplied,
    /// The payload was copied over the executable.
    Applied {
        backup: PathBuf,
        /// False when an earlier backup was kept.
        backup_created: bool,
    },
}

/// Result of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The backup was moved back over the executable.
    Restored { backup: PathBuf },
    /// No backup exists; the executable could not be restored.
    BackupMissing { executable: PathBuf },
}

impl RestoreOutcome {
    /// Manual remediation for the user, if any is needed.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Restored { .. } => None,
            Self::BackupMissing { .. } => Some(BACKUP_MISSING_GUIDANCE),
        }
    }
}

/// Redirector data directory for a game executable.
pub fn data_dir(executable: &Path) -> PathBuf {
    executable
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DATA_DIR)
}

/// Whether `executable` shows signs of a redirector apply: a backup under
/// either naming, or a redirector data directory.
pub fn is_patched(executable: &Path) -> bool {
    BackupNaming::Suffix.backup_path(executable).is_file()
        || BackupNaming::PreserveExtension
            .backup_path(executable)
            .is_file()
        || data_dir(executable).is_dir()
}

/// Applies and reverts the redirector payload.
#[derive(Debug, Clone)]
pub struct Redirector {
    payload: PathBuf,
    naming: BackupNaming,
}

impl Redirector {
    pub fn new(payload: impl Into<PathBuf>) -> Self {
        Self {
            payload: payload.into(),
            naming: BackupNaming::default(),
        }
    }

    pub fn with_naming(mut self, naming: BackupNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn payload(&self) -> &Path {
        &self.payload
    }

    pub fn naming(&self) -> BackupNaming {
        self.naming
    }

    pub fn backup_path(&self, executable: &Path) -> PathBuf {
        self.naming.backup_path(executable)
    }

    /// Whether `executable` exists and is byte-identical to the payload.
    pub fn validate(&self, executable: &Path) -> Result<bool, PatchError> {
        if !self.payload.is_file() {
            return Err(PatchError::PayloadMissing {
                path: self.payload.clone(),
            });
        }
        if !executable.is_file() {
            return Ok(false);
        }
        Ok(checksum::matches(executable, self.payload.as_path())?)
    }

    /// Replace `executable` with the payload, backing up the original once.
    pub fn apply(&self, executable: &Path) -> Result<ApplyOutcome, PatchError> {
        if self.validate(executable)? {
            tracing::debug!(executable = %executable.display(), "Redirector already applied");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let backup = self.backup_path(executable);
        let backup_created = if backup.exists() {
            tracing::debug!(backup = %backup.display(), "Keeping existing backup");
            false
        } else if executable.is_file() {
            fs::copy(executable, &backup).map_err(io_err(&backup))?;
            tracing::info!(backup = %backup.display(), "Backed up game executable");
            true
        } else {
            return Err(PatchError::ExecutableMissing {
                path: executable.to_path_buf(),
            });
        };

        fs::copy(&self.payload, executable).map_err(io_err(executable))?;
        set_executable(executable)?;
        tracing::info!(executable = %executable.display(), "Applied redirector");

        Ok(ApplyOutcome::Applied {
            backup,
            backup_created,
        })
    }

    /// Point the redirector next to `executable` at `instance_dir`.
    pub fn write_path_entry(
        &self,
        executable: &Path,
        instance_dir: &Path,
    ) -> Result<PathBuf, PatchError> {
        let dir = data_dir(executable);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let entry = dir.join(PATH_ENTRY);
        let target = instance_dir.join(INSTANCE_EXECUTABLE);
        fs::write(&entry, target.to_string_lossy().as_bytes()).map_err(io_err(&entry))?;
        tracing::debug!(entry = %entry.display(), target = %target.display(), "Wrote redirector path entry");
        Ok(entry)
    }

    /// Undo [`apply`](Self::apply) using this redirector's backup naming.
    pub fn restore(&self, executable: &Path) -> Result<RestoreOutcome, PatchError> {
        restore_from(executable, &[self.backup_path(executable)])
    }
}

/// Undo a redirector apply, whichever backup naming was used.
pub fn restore(executable: &Path) -> Result<RestoreOutcome, PatchError> {
    let candidates = [
        BackupNaming::Suffix.backup_path(executable),
        BackupNaming::PreserveExtension.backup_path(executable),
    ];
    restore_from(executable, &candidates)
}

fn restore_from(executable: &Path, candidates: &[PathBuf]) -> Result<RestoreOutcome, PatchError> {
    let Some(backup) = candidates.iter().find(|p| p.is_file()) else {
        tracing::warn!(
            executable = %executable.display(),
            "{}", BACKUP_MISSING_GUIDANCE
        );
        return Ok(RestoreOutcome::BackupMissing {
            executable: executable.to_path_buf(),
        });
    };

    fs::rename(backup, executable).map_err(io_err(executable))?;
    tracing::info!(executable = %executable.display(), "Restored game executable");

    let dir = data_dir(executable);
    if dir.is_dir() {
        fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        tracing::debug!(path = %dir.display(), "Removed redirector data");
    }

    Ok(RestoreOutcome::Restored {
        backup: backup.clone(),
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), PatchError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path).map_err(io_err(path))?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).map_err(io_err(path))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), PatchError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Game {
        _temp: TempDir,
        exe: PathBuf,
        payload: PathBuf,
    }

    fn game() -> Game {
        let temp = TempDir::new().unwrap();
        let game_dir = temp.path().join("game");
        fs::create_dir_all(&game_dir).unwrap();
        let exe = game_dir.join("Game.exe");
        fs::write(&exe, b"original game").unwrap();
        let payload = temp.path().join("redirector.exe");
        fs::write(&payload, b"redirector payload").unwrap();
        Game {
            _temp: temp,
            exe,
            payload,
        }
    }

    #[test]
    fn test_backup_naming() {
        let exe = Path::new("/game/Game.exe");
        assert_eq!(BackupNaming::Suffix.backup_path(exe), Path::new("/game/Game.exe.bak"));
        assert_eq!(
            BackupNaming::PreserveExtension.backup_path(exe),
            Path::new("/game/Game.bak.exe")
        );
        assert_eq!(
            BackupNaming::PreserveExtension.backup_path(Path::new("/game/launcher")),
            Path::new("/game/launcher.bak")
        );
    }

    #[test]
    fn test_apply_creates_backup_then_noop() {
        let g = game();
        let redirector = Redirector::new(&g.payload);

        let first = redirector.apply(&g.exe).unwrap();
        let backup = g.exe.with_file_name("Game.exe.bak");
        assert_eq!(
            first,
            ApplyOutcome::Applied {
                backup: backup.clone(),
                backup_created: true
            }
        );
        assert_eq!(fs::read(&backup).unwrap(), b"original game");
        assert_eq!(fs::read(&g.exe).unwrap(), b"redirector payload");
        assert!(redirector.validate(&g.exe).unwrap());

        assert_eq!(redirector.apply(&g.exe).unwrap(), ApplyOutcome::AlreadyApplied);
    }

    #[test]
    fn test_existing_backup_never_overwritten() {
        let g = game();
        let backup = g.exe.with_file_name("Game.exe.bak");
        fs::write(&backup, b"pristine").unwrap();

        let outcome = Redirector::new(&g.payload).apply(&g.exe).unwrap();

        assert!(matches!(
            outcome,
            ApplyOutcome::Applied {
                backup_created: false,
                ..
            }
        ));
        assert_eq!(fs::read(&backup).unwrap(), b"pristine");
    }

    #[test]
    fn test_apply_restore_round_trip() {
        let g = game();
        let before = fs::read(&g.exe).unwrap();
        let redirector = Redirector::new(&g.payload).with_naming(BackupNaming::PreserveExtension);

        redirector.apply(&g.exe).unwrap();
        redirector.write_path_entry(&g.exe, Path::new("/instances/skyrim")).unwrap();
        assert!(g.exe.with_file_name("Game.bak.exe").is_file());

        let outcome = redirector.restore(&g.exe).unwrap();

        assert!(matches!(outcome, RestoreOutcome::Restored { .. }));
        assert_eq!(fs::read(&g.exe).unwrap(), before);
        assert!(!g.exe.with_file_name("Game.bak.exe").exists());
        assert!(!data_dir(&g.exe).exists());
    }

    #[test]
    fn test_free_restore_finds_either_backup() {
        let g = game();
        Redirector::new(&g.payload)
            .with_naming(BackupNaming::PreserveExtension)
            .apply(&g.exe)
            .unwrap();

        let outcome = restore(&g.exe).unwrap();

        assert_eq!(
            outcome,
            RestoreOutcome::Restored {
                backup: g.exe.with_file_name("Game.bak.exe")
            }
        );
        assert_eq!(fs::read(&g.exe).unwrap(), b"original game");
    }

    #[test]
    fn test_restore_without_backup() {
        let g = game();
        let outcome = restore(&g.exe).unwrap();

        assert!(matches!(outcome, RestoreOutcome::BackupMissing { .. }));
        assert!(outcome.guidance().unwrap().contains("game launcher"));
        assert_eq!(fs::read(&g.exe).unwrap(), b"original game");
    }

    #[test]
    fn test_is_patched() {
        let g = game();
        assert!(!is_patched(&g.exe));
        Redirector::new(&g.payload).apply(&g.exe).unwrap();
        assert!(is_patched(&g.exe));
        restore(&g.exe).unwrap();
        assert!(!is_patched(&g.exe));
    }

    #[test]
    fn test_path_entry_contents() {
        let g = game();
        let entry = Redirector::new(&g.payload)
            .write_path_entry(&g.exe, Path::new("/instances/skyrim"))
            .unwrap();

        assert_eq!(entry, data_dir(&g.exe).join(PATH_ENTRY));
        assert_eq!(
            fs::read_to_string(&entry).unwrap(),
            "/instances/skyrim/ModOrganizer.exe"
        );
    }

    #[test]
    fn test_missing_payload() {
        let g = game();
        let redirector = Redirector::new(g.payload.with_file_name("absent.exe"));
        assert!(matches!(
            redirector.apply(&g.exe),
            Err(PatchError::PayloadMissing { .. })
        ));
    }

    #[test]
    fn test_missing_executable() {
        let g = game();
        fs::remove_file(&g.exe).unwrap();
        assert!(matches!(
            Redirector::new(&g.payload).apply(&g.exe),
            Err(PatchError::ExecutableMissing { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_sets_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let g = game();
        Redirector::new(&g.payload).apply(&g.exe).unwrap();
        let mode = fs::metadata(&g.exe).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
