//! `update` command.

use std::path::Path;

use mo2lint::config::ConfigFile;
use mo2lint::confirm::Confirm;
use mo2lint::fetch::{HttpTransport, ResourceFetcher, Transport};
use mo2lint::install::InstallOutcome;
use mo2lint::redirector::{ApplyOutcome, Redirector, INSTANCE_EXECUTABLE};
use mo2lint::session::{Pipeline, Resource, Session};
use mo2lint::state::StateError;

use super::{absolute, describe, Context};
use crate::error::CliError;

/// Reinstall Mod Organizer 2 and the redirector for the instance at `dir`.
///
/// Downloads use the `[downloads]` timeout and retry settings.
pub fn run(ctx: &Context, dir: &Path, confirm: &dyn Confirm) -> Result<(), CliError> {
    let downloads = &ctx.config.downloads;
    let transport = HttpTransport::with_timeout(downloads.timeout()).map_err(mo2lint::Error::from)?;
    let fetcher = ResourceFetcher::new(transport).with_policy(downloads.retry_policy());
    update(ctx, dir, &fetcher, confirm)
}

fn update<T: Transport>(
    ctx: &Context,
    dir: &Path,
    fetcher: &ResourceFetcher<T>,
    confirm: &dyn Confirm,
) -> Result<(), CliError> {
    let dir = absolute(dir);
    let mut store = ctx.open_store()?;

    let report = store.find(None, Some(&dir), true);
    let instance = match report.matches.as_slice() {
        [] => {
            return Err(CliError::NoMatch(format!(
                "No instance is installed at {}. Use 'mo2-lint list' to see instances.",
                dir.display()
            )))
        }
        [only] => only.clone(),
        many => {
            return Err(StateError::Ambiguous {
                path: dir.clone(),
                count: many.len(),
            }
            .into())
        }
    };

    if instance.is_pinned() {
        println!("{} is pinned; nothing updated.", describe(&instance));
        println!("  Run 'mo2-lint unpin {}' to allow updates.", dir.display());
        return Ok(());
    }

    let resource = mod_organizer_resource(&ctx.config)?;
    let session = Session::for_instance(instance);
    let pipeline = Pipeline::new(fetcher, confirm, ctx.paths.clone());
    tracing::info!(index = session.instance().index(), url = %resource.url, "Updating instance");

    match pipeline.install_resource(&session, &resource)? {
        InstallOutcome::Installed(_) => println!("Updated Mod Organizer 2 in {}", dir.display()),
        InstallOutcome::UpToDate => println!("Mod Organizer 2 is up to date"),
        InstallOutcome::Declined => println!("Kept the installed Mod Organizer 2"),
        InstallOutcome::SkippedPinned => {}
    }

    match &ctx.config.redirector.payload {
        Some(payload) => {
            let executable = session.instance().executable();
            match pipeline.apply_redirector(&session, &Redirector::new(payload))? {
                Some(ApplyOutcome::Applied { .. }) => {
                    println!("Patched {}", executable.display())
                }
                Some(ApplyOutcome::AlreadyApplied) => println!("Redirector is up to date"),
                None => {}
            }
        }
        None => tracing::warn!(
            "redirector.payload is not set; leaving the game executable unchanged"
        ),
    }

    pipeline.commit(&mut store, &session)?;
    Ok(())
}

/// The Mod Organizer 2 release archive configured under `[mod_organizer]`.
fn mod_organizer_resource(config: &ConfigFile) -> Result<Resource, CliError> {
    let url = config.mod_organizer.url.as_deref().ok_or_else(|| {
        CliError::Config(
            "No Mod Organizer 2 download configured. Set one with 'mo2-lint config set mod_organizer.url <url>'."
                .to_string(),
        )
    })?;

    let mut resource = Resource::new(url)
        .with_marker(INSTANCE_EXECUTABLE)
        .with_probe(INSTANCE_EXECUTABLE);
    if let Some(checksum) = &config.mod_organizer.checksum {
        resource = resource.with_checksum(checksum.clone());
    }
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    use mo2lint::config::AppPaths;
    use mo2lint::confirm::Unattended;
    use mo2lint::state::{Instance, Launcher, LauncherIds, StateStore};
    use tempfile::TempDir;

    const ARCHIVE: &str = "Mod.Organizer-2.5.2.7z";

    struct Fixture {
        temp: TempDir,
        ctx: Context,
    }

    impl Fixture {
        /// A registered instance whose MO2 archive is already downloaded and
        /// expanded, so no request or extraction tool is needed.
        fn new(pinned: bool) -> Self {
            let temp = TempDir::new().unwrap();
            let paths = AppPaths::new(temp.path().join("cfg"), temp.path().join("cache"));

            fs::create_dir_all(paths.downloads_dir()).unwrap();
            fs::write(paths.downloads_dir().join(ARCHIVE), b"archive").unwrap();
            let expanded = paths.extracted_dir().join("Mod.Organizer-2.5.2");
            fs::create_dir_all(&expanded).unwrap();
            fs::write(expanded.join(INSTANCE_EXECUTABLE), b"mo2 2.5.2").unwrap();

            let game = temp.path().join("game");
            fs::create_dir_all(&game).unwrap();
            fs::write(game.join("Game.exe"), b"original").unwrap();
            fs::write(temp.path().join("redirector.exe"), b"redirector").unwrap();

            let install = temp.path().join("instance");
            fs::create_dir_all(&install).unwrap();
            let mut instance = Instance::builder(1, "skyrimspecialedition", install.canonicalize().unwrap())
                .launcher(
                    Launcher::Steam,
                    LauncherIds {
                        steam: Some("489830".to_string()),
                        ..Default::default()
                    },
                )
                .game(&game, "Game.exe")
                .build()
                .unwrap();
            instance.set_pinned(pinned);
            StateStore::load(paths.registry_file(), paths.links_dir())
                .unwrap()
                .persist(&instance)
                .unwrap();

            let mut config = ConfigFile::default();
            config.mod_organizer.url = Some(format!("https://example.invalid/releases/{}", ARCHIVE));
            config.redirector.payload = Some(temp.path().join("redirector.exe"));

            Self {
                ctx: Context { config, paths },
                temp,
            }
        }

        fn path(&self, relative: &str) -> PathBuf {
            self.temp.path().join(relative)
        }
    }

    #[test]
    fn test_update_installs_and_patches() {
        let f = Fixture::new(false);

        run(&f.ctx, &f.path("instance"), &Unattended::refuse()).unwrap();

        assert_eq!(fs::read(f.path("instance/ModOrganizer.exe")).unwrap(), b"mo2 2.5.2");
        assert_eq!(fs::read(f.path("game/Game.exe")).unwrap(), b"redirector");
        assert!(f.path("game/modorganizer2/instance_path.txt").is_file());
        assert!(f.ctx.paths.links_dir().join("1").symlink_metadata().is_ok());
    }

    #[test]
    fn test_update_skips_pinned_instance() {
        let f = Fixture::new(true);

        run(&f.ctx, &f.path("instance"), &Unattended::refuse()).unwrap();

        assert!(!f.path("instance/ModOrganizer.exe").exists());
        assert_eq!(fs::read(f.path("game/Game.exe")).unwrap(), b"original");
    }

    #[test]
    fn test_update_unknown_directory() {
        let f = Fixture::new(false);

        let err = run(&f.ctx, &f.path("elsewhere"), &Unattended::refuse()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_update_requires_download_url() {
        let mut f = Fixture::new(false);
        f.ctx.config.mod_organizer.url = None;

        let err = run(&f.ctx, &f.path("instance"), &Unattended::refuse()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(fs::read(f.path("game/Game.exe")).unwrap(), b"original");
    }
}
