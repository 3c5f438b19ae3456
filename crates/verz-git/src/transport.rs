//! Blocking HTTP transport for the smart protocol.

use crate::{GitError, Result};
use std::io::Read;
use std::time::Duration;

/// Read size used when streaming a response body to a sink.
const CHUNK_SIZE: usize = 64 * 1024;

/// The two HTTP exchanges a clone needs.
///
/// Implementations block the calling thread. `post_streaming` hands the
/// response body to `sink` chunk by chunk as it arrives; a sink error aborts
/// the transfer and is returned unchanged.
pub trait Transport {
    /// Issues a GET and returns the whole response body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Issues a POST and streams the response body into `sink`.
    fn post_streaming(
        &self,
        url: &str,
        content_type: &str,
        accept: &str,
        body: Vec<u8>,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()>;
}

/// Options for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("verz/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
        }
    }
}

/// [`Transport`] over a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a transport with the given options.
    pub fn new(options: &TransportOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()
            .map_err(|e| GitError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn check_status(url: &str, response: &reqwest::blocking::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::Network(format!("{} returned HTTP {}", url, status)));
        }
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| GitError::Network(format!("GET {} failed: {}", url, e)))?;
        Self::check_status(url, &response)?;

        let body = response
            .bytes()
            .map_err(|e| GitError::Network(format!("reading {} failed: {}", url, e)))?;
        tracing::debug!(url, bytes = body.len(), "GET complete");
        Ok(body.to_vec())
    }

    fn post_streaming(
        &self,
        url: &str,
        content_type: &str,
        accept: &str,
        body: Vec<u8>,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        tracing::debug!(url, bytes = body.len(), "POST");
        let mut response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::EXPECT, "")
            .body(body)
            .send()
            .map_err(|e| GitError::Network(format!("POST {} failed: {}", url, e)))?;
        Self::check_status(url, &response)?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = 0usize;
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| GitError::Network(format!("reading {} failed: {}", url, e)))?;
            if n == 0 {
                break;
            }
            received += n;
            sink(&buf[..n])?;
        }

        tracing::debug!(url, bytes = received, "POST complete");
        Ok(())
    }
}
