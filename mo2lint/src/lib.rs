//! mo2lint - Mod Organizer 2 instance management
//!
//! This library installs and tracks independent Mod Organizer 2 instances
//! for games run through Wine/Proton. It provides:
//!
//! - A durable JSON registry of instances ([`state`])
//! - Idempotent, checksum-gated downloads ([`fetch`], [`checksum`])
//! - Archive expansion and whitelisted installation ([`extract`], [`install`])
//! - A reversible game executable patch ([`redirector`])
//! - Explicit install sessions tying the steps together ([`session`])
//!
//! Interactive decisions go through the [`confirm::Confirm`] trait, so the
//! library never prompts on its own.

pub mod checksum;
pub mod config;
pub mod confirm;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod install;
pub mod redirector;
pub mod session;
pub mod state;

pub use error::{Error, Result};
