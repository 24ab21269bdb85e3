//! Checksum-gated resource fetcher.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use thiserror::Error;

use super::http::{Request, Transport, TransportError};
use super::retry::RetryPolicy;
use crate::checksum::{self, ChecksumError, Digest};

/// Suffix for in-flight downloads; renamed away once the body is complete.
const PARTIAL_SUFFIX: &str = ".part";

/// Errors raised while fetching a resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL has no usable file name and none was supplied.
    #[error("cannot derive a file name from {url}")]
    NoFileName { url: String },

    /// The destination directory could not be created.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file in the destination could not be written, renamed or removed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cached or downloaded file could not be hashed.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// Every attempt failed; `reason` describes the last failure.
    #[error("failed to download {url} after {attempts} attempt(s): {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub destination_dir: PathBuf,
    pub expected_checksum: Option<Digest>,
    /// Overrides the file name derived from the URL.
    pub filename: Option<String>,
}

impl DownloadDescriptor {
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_dir: destination_dir.into(),
            expected_checksum: None,
            filename: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<Digest>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// File name the resource is stored under.
    ///
    /// Uses the explicit override, else the last URL path segment without
    /// query string or fragment.
    pub fn file_name(&self) -> Result<String, FetchError> {
        if let Some(name) = &self.filename {
            return Ok(name.clone());
        }
        let without_query = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        match without_query.rsplit('/').next() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(FetchError::NoFileName {
                url: self.url.clone(),
            }),
        }
    }

    /// Full path of the fetched file.
    pub fn target_path(&self) -> Result<PathBuf, FetchError> {
        Ok(self.destination_dir.join(self.file_name()?))
    }
}

/// Downloads resources into a cache directory, skipping work the checksum
/// gate says is already done.
#[derive(Debug, Clone)]
pub struct ResourceFetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> ResourceFetcher<T> {
    /// Create a fetcher with the default retry policy.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
        }
    }

    /// Set the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch a resource without extra request headers.
    pub fn fetch(&self, descriptor: &DownloadDescriptor) -> Result<PathBuf, FetchError> {
        self.fetch_with_headers(descriptor, &[])
    }

    /// Return the cached file if it already satisfies the descriptor.
    ///
    /// A cached file that fails the checksum gate is deleted so the next
    /// download starts clean.
    pub fn cached(&self, descriptor: &DownloadDescriptor) -> Result<Option<PathBuf>, FetchError> {
        let target = descriptor.target_path()?;
        if !target.is_file() {
            return Ok(None);
        }

        match &descriptor.expected_checksum {
            None => {
                tracing::debug!(path = %target.display(), "Resource already present; skipping download");
                Ok(Some(target))
            }
            Some(expected) => {
                if checksum::matches(target.as_path(), expected)? {
                    tracing::debug!(path = %target.display(), "Cached resource verified; skipping download");
                    Ok(Some(target))
                } else {
                    tracing::warn!(
                        path = %target.display(),
                        expected = %expected,
                        "Cached resource failed checksum; downloading again"
                    );
                    remove_file(&target)?;
                    Ok(None)
                }
            }
        }
    }

    /// Fetch a resource, sending `headers` with every request.
    ///
    /// Returns immediately without touching the network when the target file
    /// already exists and passes the checksum gate. Otherwise downloads up to
    /// `policy.max_attempts` times, deleting a file whose checksum does not
    /// match before retrying.
    pub fn fetch_with_headers(
        &self,
        descriptor: &DownloadDescriptor,
        headers: &[(String, String)],
    ) -> Result<PathBuf, FetchError> {
        let dir = &descriptor.destination_dir;
        fs::create_dir_all(dir).map_err(|source| FetchError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        if let Some(path) = self.cached(descriptor)? {
            return Ok(path);
        }

        let target = descriptor.target_path()?;
        let partial = partial_path(&target);
        let request = Request::get(&descriptor.url).with_headers(headers);
        let attempts = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            let delay = self.policy.delay_after(attempt - 1);
            if !delay.is_zero() {
                tracing::debug!(url = %descriptor.url, delay_ms = delay.as_millis() as u64, "Waiting before retry");
                thread::sleep(delay);
            }

            tracing::debug!(url = %descriptor.url, attempt, attempts, "Downloading resource");

            if let Err(e) = self.download_once(&request, &partial) {
                tracing::warn!(url = %descriptor.url, attempt, error = %e, "Download attempt failed");
                remove_file(&partial)?;
                last_reason = e.to_string();
                continue;
            }

            fs::rename(&partial, &target).map_err(|source| FetchError::Write {
                path: target.clone(),
                source,
            })?;

            let Some(expected) = &descriptor.expected_checksum else {
                tracing::info!(url = %descriptor.url, path = %target.display(), "Downloaded resource");
                return Ok(target);
            };

            match checksum::verify(&target, expected) {
                Ok(()) => {
                    tracing::info!(
                        url = %descriptor.url,
                        path = %target.display(),
                        attempt,
                        "Downloaded and verified resource"
                    );
                    return Ok(target);
                }
                Err(e @ ChecksumError::Mismatch { .. }) => {
                    tracing::warn!(url = %descriptor.url, attempt, error = %e, "Downloaded resource failed checksum");
                    remove_file(&target)?;
                    last_reason = e.to_string();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FetchError::Exhausted {
            url: descriptor.url.clone(),
            attempts,
            reason: last_reason,
        })
    }

    fn download_once(&self, request: &Request<'_>, partial: &Path) -> Result<u64, AttemptError> {
        let file = File::create(partial).map_err(AttemptError::Io)?;
        let mut writer = BufWriter::new(file);
        let bytes = self.transport.get(request, &mut writer)?;
        writer.flush().map_err(AttemptError::Io)?;
        Ok(bytes)
    }
}

/// Failure of a single attempt; folded into `FetchError::Exhausted`.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("local I/O error: {0}")]
    Io(std::io::Error),
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn remove_file(path: &Path) -> Result<(), FetchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FetchError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}
