//! Nexus Mods downloads.
//!
//! Resolves a mod file's CDN link through the Nexus v1 API and hands the
//! actual transfer to the [`ResourceFetcher`], so Nexus resources get the same
//! cache and checksum behavior as plain URLs.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::fetcher::{DownloadDescriptor, FetchError, ResourceFetcher};
use super::http::{Request, Transport, TransportError};
use crate::checksum::Digest;

/// Base URL of the Nexus Mods v1 API.
pub const DEFAULT_API_BASE: &str = "https://api.nexusmods.com/v1";

/// Application name reported to the Nexus API.
const APPLICATION_NAME: &str = "mo2lint";

/// Mirror preferred when the API offers several.
const PREFERRED_MIRROR: &str = "Nexus CDN";

/// Errors raised while resolving or downloading a Nexus file.
#[derive(Debug, Error)]
pub enum NexusError {
    /// No API key is available.
    #[error("no Nexus Mods API key available: {0}")]
    MissingCredentials(String),

    /// An API request failed.
    #[error("Nexus API request failed: {0}")]
    Api(#[from] TransportError),

    /// The API returned a body that could not be understood.
    #[error("unexpected Nexus API response from {url}: {reason}")]
    Response { url: String, reason: String },

    /// The API returned no download links for the file.
    #[error("no download link offered for {game} mod {mod_id} file {file_id}")]
    NoDownloadLink {
        game: String,
        mod_id: u64,
        file_id: u64,
    },

    /// The resolved file could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Supplies the API key used to authorize Nexus requests.
///
/// The SSO handshake that obtains the key lives outside this crate.
pub trait CredentialProvider {
    fn api_key(&self) -> Result<String, NexusError>;
}

/// A fixed API key.
#[derive(Debug, Clone)]
pub struct StaticKey(pub String);

impl CredentialProvider for StaticKey {
    fn api_key(&self) -> Result<String, NexusError> {
        if self.0.trim().is_empty() {
            return Err(NexusError::MissingCredentials("configured key is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// A single file of a mod hosted on Nexus Mods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexusFile {
    /// Nexus game domain, e.g. `skyrimspecialedition`.
    pub game: String,
    pub mod_id: u64,
    pub file_id: u64,
}

impl NexusFile {
    pub fn new(game: impl Into<String>, mod_id: u64, file_id: u64) -> Self {
        Self {
            game: game.into(),
            mod_id,
            file_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    #[serde(default)]
    short_name: String,
    #[serde(rename = "URI")]
    uri: String,
}

/// Client for Nexus-hosted resources.
pub struct NexusClient<'a, T: Transport> {
    fetcher: &'a ResourceFetcher<T>,
    credentials: &'a dyn CredentialProvider,
    api_base: String,
}

impl<'a, T: Transport> NexusClient<'a, T> {
    pub fn new(fetcher: &'a ResourceFetcher<T>, credentials: &'a dyn CredentialProvider) -> Self {
        Self {
            fetcher,
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<Vec<(String, String)>, NexusError> {
        Ok(vec![
            ("apikey".to_string(), self.credentials.api_key()?),
            ("Application-Name".to_string(), APPLICATION_NAME.to_string()),
            (
                "Application-Version".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ])
    }

    fn get_json<R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<R, NexusError> {
        let mut body = Vec::new();
        self.fetcher
            .transport()
            .get(&Request::get(url).with_headers(headers), &mut body)?;
        serde_json::from_slice(&body).map_err(|e| NexusError::Response {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn file_url(&self, file: &NexusFile) -> String {
        format!(
            "{}/games/{}/mods/{}/files/{}",
            self.api_base, file.game, file.mod_id, file.file_id
        )
    }

    /// Look up the original file name of a Nexus file.
    pub fn file_name(&self, file: &NexusFile) -> Result<String, NexusError> {
        let url = format!("{}.json", self.file_url(file));
        let info: FileInfo = self.get_json(&url, &self.headers()?)?;
        Ok(info.file_name)
    }

    /// Resolve the CDN URL for a file, preferring the Nexus CDN mirror.
    pub fn download_link(&self, file: &NexusFile) -> Result<String, NexusError> {
        let url = format!("{}/download_link.json", self.file_url(file));
        let links: Vec<DownloadLink> = self.get_json(&url, &self.headers()?)?;
        tracing::debug!(game = %file.game, mod_id = file.mod_id, file_id = file.file_id, mirrors = links.len(), "Resolved Nexus download links");

        links
            .iter()
            .find(|link| link.short_name == PREFERRED_MIRROR)
            .or_else(|| links.first())
            .map(|link| link.uri.replace("\\u0026", "&"))
            .ok_or_else(|| NexusError::NoDownloadLink {
                game: file.game.clone(),
                mod_id: file.mod_id,
                file_id: file.file_id,
            })
    }

    /// Download a Nexus file into `destination_dir`.
    ///
    /// When `filename` is known and the cached copy passes the checksum gate,
    /// no download link is requested.
    pub fn download(
        &self,
        file: &NexusFile,
        destination_dir: &Path,
        filename: Option<&str>,
        checksum: Option<&Digest>,
    ) -> Result<PathBuf, NexusError> {
        let filename = match filename {
            Some(name) => name.to_string(),
            None => self.file_name(file)?,
        };

        let mut descriptor = DownloadDescriptor::new(String::new(), destination_dir)
            .with_filename(filename);
        descriptor.expected_checksum = checksum.cloned();

        if let Some(path) = self.fetcher.cached(&descriptor)? {
            return Ok(path);
        }

        tracing::info!(game = %file.game, mod_id = file.mod_id, file_id = file.file_id, "Requesting Nexus download");
        descriptor.url = self.download_link(file)?;
        let path = self.fetcher.fetch_with_headers(&descriptor, &self.headers()?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetcher::tests::ScriptedTransport;
    use std::fs;
    use tempfile::TempDir;

    const LINKS: &str = r#"[
        {"name": "Paris", "short_name": "Paris", "URI": "https://paris.example/file.7z"},
        {"name": "Nexus CDN", "short_name": "Nexus CDN", "URI": "https://cdn.example/file.7z?a=1\\u0026b=2"}
    ]"#;

    #[test]
    fn test_static_key_rejects_empty() {
        assert!(StaticKey("  ".to_string()).api_key().is_err());
        assert_eq!(StaticKey("abc".to_string()).api_key().unwrap(), "abc");
    }

    #[test]
    fn test_download_link_prefers_cdn() {
        let fetcher = ResourceFetcher::new(ScriptedTransport::new().respond(LINKS.as_bytes()));
        let key = StaticKey("secret".to_string());
        let client = NexusClient::new(&fetcher, &key);

        let link = client.download_link(&NexusFile::new("skyrim", 1, 2)).unwrap();
        assert_eq!(link, "https://cdn.example/file.7z?a=1&b=2");

        let requests = fetcher.transport().requests.borrow();
        assert_eq!(
            requests[0].0,
            "https://api.nexusmods.com/v1/games/skyrim/mods/1/files/2/download_link.json"
        );
        assert!(requests[0]
            .1
            .contains(&("apikey".to_string(), "secret".to_string())));
    }

    #[test]
    fn test_download_link_empty() {
        let fetcher = ResourceFetcher::new(ScriptedTransport::new().respond(b"[]"));
        let key = StaticKey("secret".to_string());
        let client = NexusClient::new(&fetcher, &key);

        let result = client.download_link(&NexusFile::new("skyrim", 1, 2));
        assert!(matches!(result, Err(NexusError::NoDownloadLink { .. })));
    }

    #[test]
    fn test_download_resolves_name_then_link() {
        let temp = TempDir::new().unwrap();
        let fetcher = ResourceFetcher::new(
            ScriptedTransport::new()
                .respond(br#"{"file_name": "skse.7z"}"#)
                .respond(LINKS.as_bytes())
                .respond(b"archive"),
        );
        let key = StaticKey("secret".to_string());
        let client = NexusClient::new(&fetcher, &key).with_api_base("http://api.test/v1/");

        let path = client
            .download(&NexusFile::new("skyrim", 1, 2), temp.path(), None, None)
            .unwrap();

        assert_eq!(path, temp.path().join("skse.7z"));
        assert_eq!(fs::read(&path).unwrap(), b"archive");
        let requests = fetcher.transport().requests.borrow();
        assert_eq!(requests[0].0, "http://api.test/v1/games/skyrim/mods/1/files/2.json");
        assert_eq!(requests[2].0, "https://cdn.example/file.7z?a=1&b=2");
    }

    #[test]
    fn test_cached_download_skips_api() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("skse.7z"), b"archive").unwrap();
        let fetcher = ResourceFetcher::new(ScriptedTransport::new());
        let key = StaticKey("secret".to_string());
        let client = NexusClient::new(&fetcher, &key);

        let path = client
            .download(&NexusFile::new("skyrim", 1, 2), temp.path(), Some("skse.7z"), None)
            .unwrap();

        assert_eq!(path, temp.path().join("skse.7z"));
        assert_eq!(fetcher.transport().request_count(), 0);
    }
}
