//! CLI error type and exit codes.

use std::fmt;

use mo2lint::config::ConfigError;
use mo2lint::state::StateError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or unusable configuration.
    Config(String),
    /// No instance matched the given filters.
    NoMatch(String),
    /// A library operation failed.
    Library(mo2lint::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::NoMatch(_) => 3,
            CliError::Library(e) if e.is_fatal() => 1,
            CliError::Library(_) => 4,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::NoMatch(msg) => write!(f, "{}", msg),
            CliError::Library(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Library(e) => Some(e),
            _ => None,
        }
    }
}

impl From<mo2lint::Error> for CliError {
    fn from(e: mo2lint::Error) -> Self {
        CliError::Library(e)
    }
}

impl From<StateError> for CliError {
    fn from(e: StateError) -> Self {
        CliError::Library(e.into())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<mo2lint::redirector::PatchError> for CliError {
    fn from(e: mo2lint::redirector::PatchError) -> Self {
        CliError::Library(e.into())
    }
}
