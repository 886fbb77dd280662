//! HTTP fetch capability with bounded retry.
//!
//! Providers receive a `Fetch` implementation by injection; production code
//! uses [`HttpFetcher`], tests substitute canned payloads.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Retrieve the body at `url` as raw bytes.
pub trait Fetch: Send + Sync {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, FetchError>;
}

/// Statuses that are retried rather than failing immediately.
const RETRY_STATUSES: [u16; 3] = [500, 502, 504];

/// Blocking HTTP client.
///
/// Connect/timeout errors and HTTP 500/502/504 are retried up to
/// `max_retries` times with exponential backoff (`base_delay * 2^(n-1)`).
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay: Duration::from_millis(300),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(url, attempt, ?delay, "retrying request");
                std::thread::sleep(delay);
            }

            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send() {
                Ok(resp) => {
                    let status = resp.status();

                    if RETRY_STATUSES.contains(&status.as_u16()) {
                        warn!(url, %status, "server error");
                        last_error = Some(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }

                    if !status.is_success() {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    let body = resp.bytes().map_err(|e| FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
                    debug!(url, %status, bytes = body.len(), "request OK");
                    return Ok(body.to_vec());
                }
                Err(e) => {
                    let err = FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    };
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transport {
            url: url.to_string(),
            message: "max retries exceeded".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_url() {
        let e = FetchError::Status {
            status: 502,
            url: "http://example.invalid/x".into(),
        };
        assert_eq!(e.to_string(), "HTTP 502 for http://example.invalid/x");
    }

    #[test]
    fn client_builds_with_default_policy() {
        let fetcher = HttpFetcher::new().unwrap();
        assert_eq!(fetcher.max_retries, 3);
        assert_eq!(fetcher.base_delay, Duration::from_millis(300));

        let tuned = fetcher.with_retries(1, Duration::from_millis(10));
        assert_eq!(tuned.max_retries, 1);
    }

    #[test]
    fn unreachable_host_fails_after_retries() {
        let fetcher = HttpFetcher::new()
            .unwrap()
            .with_retries(1, Duration::from_millis(1));
        // Port 9 on localhost is the discard service and is normally closed.
        let result = fetcher.get("http://127.0.0.1:9/", &[]);
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }
}
