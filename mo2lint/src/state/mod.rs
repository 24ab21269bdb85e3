//! Durable instance registry.
//!
//! This module handles:
//! - Loading and saving the JSON registry document
//! - Matching instances by game identity and install path
//! - Allocating stable, never-reused indices
//! - Removing instance links, payloads and records
//!
//! The document lives at `<config dir>/mo2-lint/instance_state.json`.

mod instance;
mod store;
mod symlink;
mod trash;

use std::path::PathBuf;

use thiserror::Error;

use crate::redirector::PatchError;

pub use instance::{Instance, InstanceBuilder, InvalidInstance, Launcher, LauncherIds};
pub use store::{
    has_conflict_marker, mark_conflict, Component, Conflict, MatchReport, NexusCredentials,
    Registry, RemovalReport, StateStore, CONFLICT_MARKER,
};
pub use symlink::link_path;
pub use trash::{delete_permanently, Trash};

#[cfg(test)]
pub(crate) use instance::tests::{sample as sample_instance, steam_ids};

/// Errors raised by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// The registry document cannot be parsed. Aborts the run.
    #[error("instance registry {} is corrupt ({reason}); repair or delete the file", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process wrote the registry since it was loaded.
    #[error(
        "instance registry {} changed on disk (revision {found}, expected {expected}); reload and retry",
        .path.display()
    )]
    ConcurrentModification {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("no instance installed at {}", .0.display())]
    NotFound(PathBuf),

    #[error("{count} instances installed at {}", .path.display())]
    Ambiguous { path: PathBuf, count: usize },

    #[error("no instance with index {0}")]
    UnknownIndex(u32),

    #[error("instance indices exhausted (last issued {0})")]
    IndexExhausted(u32),

    #[error("{} exists and is not a symlink", .path.display())]
    LinkOccupied { path: PathBuf },

    #[error("no trash directory available")]
    NoTrash,

    #[error("failed to serialize instance registry: {0}")]
    Serialize(String),

    #[error(transparent)]
    Invalid(#[from] InvalidInstance),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
