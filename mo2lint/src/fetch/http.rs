//! HTTP transport for resource downloads.
//!
//! The fetcher talks to the network only through the [`Transport`] trait, so
//! retry and cache behavior can be tested without a server.

use std::io::{Read, Write};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Errors produced by a single transfer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The server answered with a non-success status.
    #[error("GET {url} failed with status {status}")]
    Status { url: String, status: u16 },

    /// The request did not complete in time.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The request failed before or while streaming the body.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The response body could not be written to the sink.
    #[error("failed to write response body from {url}: {source}")]
    Write {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// A plain HTTP GET request.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub url: &'a str,
    pub headers: &'a [(String, String)],
}

impl<'a> Request<'a> {
    pub fn get(url: &'a str) -> Self {
        Self { url, headers: &[] }
    }

    pub fn with_headers(mut self, headers: &'a [(String, String)]) -> Self {
        self.headers = headers;
        self
    }
}

/// Performs a GET request and streams the body into `sink`.
pub trait Transport {
    /// Returns the number of body bytes written.
    fn get(&self, request: &Request<'_>, sink: &mut dyn Write) -> Result<u64, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, request: &Request<'_>, sink: &mut dyn Write) -> Result<u64, TransportError> {
        (**self).get(request, sink)
    }
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mo2lint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &Request<'_>, sink: &mut dyn Write) -> Result<u64, TransportError> {
        let url = request.url;
        let mut builder = self.client.get(url);
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| TransportError::Request {
                    url: url.to_string(),
                    reason: format!("read error: {}", e),
                })?;

            if bytes_read == 0 {
                break;
            }

            sink.write_all(&buffer[..bytes_read])
                .map_err(|source| TransportError::Write {
                    url: url.to_string(),
                    source,
                })?;

            downloaded += bytes_read as u64;
        }

        sink.flush().map_err(|source| TransportError::Write {
            url: url.to_string(),
            source,
        })?;

        tracing::trace!(url, bytes = downloaded, "Transfer complete");
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_default_timeout() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_http_transport_with_timeout() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(transport.timeout().as_secs(), 60);
    }

    #[test]
    fn test_request_builder() {
        let headers = vec![("apikey".to_string(), "secret".to_string())];
        let request = Request::get("https://example.com/file.zip").with_headers(&headers);
        assert_eq!(request.url, "https://example.com/file.zip");
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status {
            url: "http://x/file.zip".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "GET http://x/file.zip failed with status 404");
    }
}
