//! `uninstall` command.

use std::path::PathBuf;

use console::style;
use mo2lint::confirm::{Confirm, RemovalChoice};
use mo2lint::redirector::RestoreOutcome;
use mo2lint::state::{Component, Instance, StateStore};

use super::{absolute, describe, Context};
use crate::error::CliError;

/// Options for `uninstall`.
pub struct UninstallArgs {
    pub game: Option<String>,
    pub dir: Option<PathBuf>,
    /// Leave the install directory and game executable alone.
    pub keep_payload: bool,
}

/// Uninstall every instance matching the filters, asking for each one.
pub fn run(ctx: &Context, args: UninstallArgs, confirm: &dyn Confirm) -> Result<(), CliError> {
    if args.game.is_none() && args.dir.is_none() {
        return Err(CliError::Config(
            "Specify --game or --dir to choose the instances to uninstall.".to_string(),
        ));
    }

    let mut store = ctx.open_store()?;
    let dir = args.dir.as_deref().map(absolute);
    let report = store.find(args.game.as_deref(), dir.as_deref(), true);

    if report.matches.is_empty() {
        return Err(CliError::NoMatch(
            "No matching instances. Use 'mo2-lint list' to see instances.".to_string(),
        ));
    }

    let components: &[Component] = if args.keep_payload {
        &[Component::Symlink, Component::State]
    } else {
        &Component::ALL
    };

    remove_instances(&mut store, &report.matches, components, confirm)
}

/// Uninstall each of `instances` after asking.
///
/// The registry is saved after every removal, so a failure part way through
/// never leaves an already removed instance on record.
fn remove_instances(
    store: &mut StateStore,
    instances: &[Instance],
    components: &[Component],
    confirm: &dyn Confirm,
) -> Result<(), CliError> {
    for instance in instances {
        if !confirm.confirm(&format!("Uninstall {}?", describe(instance)), false) {
            println!("Skipped {}", describe(instance));
            continue;
        }

        let result = store.remove(instance.index(), components, confirm)?;
        store.save()?;

        match result.payload {
            Some(RemovalChoice::Trash) => println!("  Moved files to trash"),
            Some(RemovalChoice::Delete) => println!("  Deleted files"),
            Some(RemovalChoice::Keep) => println!("  Kept files at {}", instance.install_path().display()),
            None => {}
        }
        if let Some(outcome) = &result.restore {
            match outcome {
                RestoreOutcome::Restored { .. } => {
                    println!("  Restored {}", instance.executable().display())
                }
                RestoreOutcome::BackupMissing { .. } => println!(
                    "  {} {}",
                    style("Warning:").yellow().bold(),
                    outcome.guidance().unwrap_or_default()
                ),
            }
        }
        println!("Uninstalled {}", describe(instance));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    use mo2lint::state::{Launcher, LauncherIds, Trash};
    use tempfile::TempDir;

    /// Says yes to everything and answers removal prompts in order.
    struct Answers {
        removals: RefCell<Vec<RemovalChoice>>,
    }

    impl Confirm for Answers {
        fn confirm(&self, _prompt: &str, _default: bool) -> bool {
            true
        }

        fn choose(&self, _prompt: &str, _options: &[&str], _default: usize) -> Option<usize> {
            let next = self.removals.borrow_mut().remove(0);
            RemovalChoice::ALL.iter().position(|c| *c == next)
        }
    }

    fn instance(index: u32, install: &Path) -> Instance {
        Instance::builder(index, "skyrimspecialedition", install)
            .launcher(
                Launcher::Steam,
                LauncherIds {
                    steam: Some("489830".to_string()),
                    ..Default::default()
                },
            )
            .game("/games/skyrim", "SkyrimSE.exe")
            .build()
            .unwrap()
    }

    #[test]
    fn test_failed_removal_keeps_earlier_removals_saved() {
        let temp = TempDir::new().unwrap();
        let registry = temp.path().join("cfg/instance_state.json");
        let links = temp.path().join("cfg/instances");
        // a file where the trash directory should be makes trashing fail
        let blocked_trash = temp.path().join("Trash");
        fs::write(&blocked_trash, b"").unwrap();

        let first = instance(1, &temp.path().join("mo2-a"));
        let second = instance(2, &temp.path().join("mo2-b"));
        fs::create_dir_all(first.install_path()).unwrap();
        fs::create_dir_all(second.install_path()).unwrap();

        let mut store = StateStore::load(&registry, &links)
            .unwrap()
            .with_trash(Trash::at(&blocked_trash));
        store.persist(&first).unwrap();
        store.persist(&second).unwrap();

        let answers = Answers {
            removals: RefCell::new(vec![RemovalChoice::Delete, RemovalChoice::Trash]),
        };
        let result = remove_instances(
            &mut store,
            &[first.clone(), second.clone()],
            &Component::ALL,
            &answers,
        );

        assert!(result.is_err());
        assert!(!first.install_path().exists());
        assert!(second.install_path().is_dir());

        let reloaded = StateStore::load(&registry, &links).unwrap();
        assert_eq!(reloaded.instances(), &[second]);
    }

    #[test]
    fn test_declined_instance_left_alone() {
        let temp = TempDir::new().unwrap();
        let registry = temp.path().join("cfg/instance_state.json");
        let links = temp.path().join("cfg/instances");
        let only = instance(1, &temp.path().join("mo2"));

        let mut store = StateStore::load(&registry, &links).unwrap();
        store.persist(&only).unwrap();

        remove_instances(
            &mut store,
            &[only.clone()],
            &Component::ALL,
            &mo2lint::confirm::Unattended::refuse(),
        )
        .unwrap();

        assert_eq!(StateStore::load(&registry, &links).unwrap().instances(), &[only]);
    }
}
