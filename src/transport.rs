use std::io::{self, Read};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};

use crate::error::FetchError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3050);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(27);

/// An open response whose body has not been read yet.
///
/// Dropping it releases the underlying connection.
pub struct TransferResponse {
    pub total_size: u64,
    pub body: Box<dyn Read + Send>,
}

pub trait Transport: Send + Sync {
    /// Issue a GET for `url` and return the streaming body.
    fn open(&self, url: &str) -> Result<TransferResponse, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xfetcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::InvalidInput(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|err| FetchError::TransferFailure {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(FetchError::TransferFailure {
            url: url.to_string(),
            message: format!("server returned status {}", response.status()),
        })
    }
}

impl Transport for ReqwestTransport {
    fn open(&self, url: &str) -> Result<TransferResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| classify_request_error(url, &err))?;
        let response = Self::handle_status(url, response)?;
        let total_size = content_length(response.headers());
        Ok(TransferResponse {
            total_size,
            body: Box::new(response),
        })
    }
}

/// Size advertised by the server, 0 when absent or unparseable.
pub fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

pub fn classify_request_error(url: &str, err: &reqwest::Error) -> FetchError {
    let url = url.to_string();
    let message = err.to_string();
    if err.is_connect() {
        FetchError::ConnectionFailure { url, message }
    } else if err.is_timeout() {
        FetchError::Timeout { url, message }
    } else {
        FetchError::TransferFailure { url, message }
    }
}

/// Map an error raised while reading a response body onto the transfer taxonomy.
pub fn classify_read_error(url: &str, err: &io::Error) -> FetchError {
    if let Some(inner) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
    {
        return classify_request_error(url, inner);
    }
    let url = url.to_string();
    let message = err.to_string();
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FetchError::Timeout { url, message },
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => FetchError::ConnectionFailure { url, message },
        _ => FetchError::TransferFailure { url, message },
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn content_length_defaults_to_zero() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("not-a-number"));
        assert_eq!(content_length(&headers), 0);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2048"));
        assert_eq!(content_length(&headers), 2048);
    }

    #[test]
    fn read_errors_are_classified() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_matches!(
            classify_read_error("http://x", &reset),
            FetchError::ConnectionFailure { .. }
        );
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_matches!(classify_read_error("http://x", &timeout), FetchError::Timeout { .. });
        let other = io::Error::other("boom");
        assert_matches!(
            classify_read_error("http://x", &other),
            FetchError::TransferFailure { .. }
        );
    }

    #[test]
    fn client_builds_with_default_timeouts() {
        assert!(ReqwestTransport::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).is_ok());
    }
}
