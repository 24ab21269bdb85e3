//! Resource acquisition.
//!
//! This module downloads the external resources an instance needs:
//! - Plain HTTP GET transport behind a trait (`http`)
//! - Retry policy with configurable backoff (`retry`)
//! - Cache-aware, checksum-gated fetching (`fetcher`)
//! - Nexus Mods link resolution (`nexus`)
//!
//! # Architecture
//!
//! ```text
//! NexusClient ──► ResourceFetcher ──► Transport (trait)
//!                       │                  └── HttpTransport (reqwest)
//!                       ├── RetryPolicy
//!                       └── checksum gate
//! ```

mod fetcher;
mod http;
mod nexus;
mod retry;

pub use fetcher::{DownloadDescriptor, FetchError, ResourceFetcher};
pub use http::{HttpTransport, Request, Transport, TransportError, DEFAULT_TIMEOUT_SECS};
pub use nexus::{CredentialProvider, NexusClient, NexusError, NexusFile, StaticKey};
pub use retry::{Backoff, RetryPolicy, DEFAULT_ATTEMPTS};

#[cfg(test)]
pub(crate) use fetcher::tests::ScriptedTransport;
