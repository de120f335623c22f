//! HTTP transport abstraction.
//!
//! The transfer engine only needs a single GET with an optional byte range.
//! Redirects are never followed here; the engine handles them itself so it
//! can fall back to mirrors.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, RANGE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use super::error::TransferError;

/// Connect timeout for every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Value of the `Content-Length` header, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }
}

/// Parse the `Content-Length` header of `headers`.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Blocking HTTP GET.
///
/// Implementations must not follow redirects.
pub trait HttpTransport: Send + Sync {
    /// Issue a GET for `url`, asking for `bytes=<start>-` when `range_start`
    /// is set.
    fn get(&self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, TransferError>;
}

/// Production transport backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with redirects disabled and a 5 second connect
    /// timeout. There is no overall timeout; packages are large.
    pub fn new() -> Result<Self, TransferError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Option::<Duration>::None)
            .build()
            .map_err(|e| TransferError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, TransferError> {
        let mut request = self.client.get(url);
        if let Some(start) = range_start {
            let value = HeaderValue::from_str(&format!("bytes={}-", start))
                .map_err(|e| TransferError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            request = request.header(RANGE, value);
        }

        let response = request.send().map_err(|e| TransferError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(HttpResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        let response = HttpResponse {
            status: StatusCode::OK,
            headers,
            body: Box::new(Cursor::new(Vec::new())),
        };
        assert_eq!(response.content_length(), Some(1234));
    }

    #[test]
    fn test_missing_content_length() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Box::new(Cursor::new(Vec::new())),
        };
        assert_eq!(response.content_length(), None);
    }
}
