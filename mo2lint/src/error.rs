//! Crate-level error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::fetch::{FetchError, NexusError, TransportError};
use crate::install::InstallError;
use crate::redirector::PatchError;
use crate::state::{InvalidInstance, StateError};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Nexus(#[from] NexusError),

    /// The HTTP client could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Invalid(#[from] InvalidInstance),

    /// The user declined to share an install path with another game.
    #[error("{} is already used by {existing}; not installing {requested} there", .path.display())]
    ConflictDeclined {
        path: PathBuf,
        existing: String,
        requested: String,
    },
}

impl Error {
    /// Whether the whole run should stop.
    ///
    /// Resource-scoped failures (downloads, checksums, extraction) are
    /// recoverable: the caller may skip an optional resource and continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::State(_) | Self::Config(_) | Self::Invalid(_) | Self::Patch(_) => true,
            // includes a whitelisted file missing from the source
            Self::Install(_) => true,
            Self::Checksum(_)
            | Self::Fetch(_)
            | Self::Nexus(_)
            | Self::Transport(_)
            | Self::Extract(_) => false,
            Self::ConflictDeclined { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Digest;

    #[test]
    fn test_severity() {
        let corrupt: Error = StateError::Corrupt {
            path: PathBuf::from("/cfg/instance_state.json"),
            reason: "eof".to_string(),
        }
        .into();
        assert!(corrupt.is_fatal());

        let exhausted: Error = FetchError::Exhausted {
            url: "http://x/file.zip".to_string(),
            attempts: 3,
            reason: "status 503".to_string(),
        }
        .into();
        assert!(!exhausted.is_fatal());

        let mismatch: Error = ChecksumError::Mismatch {
            file: PathBuf::from("/cache/file.zip"),
            expected: Digest::new("aa"),
            actual: Digest::new("bb"),
        }
        .into();
        assert!(!mismatch.is_fatal());

        let missing: Error = InstallError::MissingFile {
            source_dir: PathBuf::from("/src"),
            entry: "a/b.txt".to_string(),
        }
        .into();
        assert!(missing.is_fatal());
    }

    #[test]
    fn test_messages_carry_context() {
        let err: Error = ChecksumError::Mismatch {
            file: PathBuf::from("/cache/file.zip"),
            expected: Digest::new("aa"),
            actual: Digest::new("bb"),
        }
        .into();
        let message = err.to_string();
        assert!(message.contains("/cache/file.zip"));
        assert!(message.contains("aa"));
        assert!(message.contains("bb"));
    }
}
