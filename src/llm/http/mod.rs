#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::ScoutError;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking HTTP agent with the retry policy shared by every provider client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl HttpTransport {
    #[inline]
    pub fn new(timeout: Duration, retry_attempts: u32) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            retry_attempts: retry_attempts.max(1),
        }
    }

    #[cfg(test)]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// GET `url` and return the body, with optional extra headers
    #[inline]
    pub fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String> {
        self.with_retry(url, || {
            let mut request = self.agent.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    /// POST a JSON body to `url` and return the response body
    #[inline]
    pub fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &str) -> Result<String> {
        self.with_retry(url, || {
            let mut request = self
                .agent
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn with_retry<F>(&self, url: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(network_error(format!("Client error: HTTP {status}")));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(network_error(format!("Non-retryable error: {error}")));
                    }

                    last_error = Some(network_error(format!("Request error: {error}")));

                    if attempt < self.retry_attempts {
                        let delay = backoff_delay(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error
            .unwrap_or_else(|| network_error("Request failed after retries".to_string())))
    }
}

fn network_error(message: String) -> anyhow::Error {
    ScoutError::Network(message).into()
}

/// Resolve `path` below `base`, keeping any path prefix `base` already has
/// (`https://proxy/gemini` + `v1beta/models` is `https://proxy/gemini/v1beta/models`)
#[inline]
pub fn join_endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Failed to join {path} onto {base}"))
}

/// 1s, 2s, 4s, ... for attempts 1, 2, 3, ...
#[inline]
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt.saturating_sub(1)) * 1000)
}
