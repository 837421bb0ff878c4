use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde_json::json;
use tokio::time::timeout;
use url::Url;

use crate::logging::Logger;
use crate::stream_format::is_manifest_suffix;

/// Anything that can tell whether a stream URL is currently playable.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_alive(&self, url: &str) -> bool;
}

/// Cheap network probe for a single stream URL.
///
/// `verify` is total: timeouts, refused connections, DNS errors and bad
/// statuses all come back as `false`.
#[derive(Clone)]
pub struct HealthVerifier {
    client: Client,
    timeout: Duration,
    logger: Logger,
}

#[derive(Debug)]
enum ProbeError {
    Network(reqwest::Error),
    Status(StatusCode),
    EmptyBody,
}

impl HealthVerifier {
    pub fn new(client: Client, timeout: Duration, logger: Logger) -> Self {
        Self {
            client,
            timeout,
            logger,
        }
    }

    pub async fn verify(&self, url: &str, probe_timeout: Duration) -> bool {
        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.logger.debug(
                    "verify.invalid_url",
                    json!({ "url": url, "error": err.to_string() }),
                );
                return false;
            }
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            // rtsp://, mms:// and friends cannot be probed cheaply
            return true;
        }

        let probe = async {
            if is_manifest_suffix(url) {
                self.probe_head(url).await
            } else {
                self.probe_first_chunk(url).await
            }
        };

        match timeout(probe_timeout, probe).await {
            Ok(Ok(())) => true,
            Ok(Err(reason)) => {
                self.logger.debug(
                    "verify.dead",
                    json!({ "url": url, "reason": format!("{:?}", reason) }),
                );
                false
            }
            Err(_) => {
                self.logger.debug(
                    "verify.timeout",
                    json!({ "url": url, "timeoutMs": probe_timeout.as_millis() as u64 }),
                );
                false
            }
        }
    }

    async fn probe_head(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(ProbeError::Network)?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(ProbeError::Status(other)),
        }
    }

    /// Reads at most one chunk of the body and then drops the connection.
    async fn probe_first_chunk(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(ProbeError::Network)?;
        if response.status() != StatusCode::OK {
            return Err(ProbeError::Status(response.status()));
        }

        let mut body = response.bytes_stream();
        match body.next().await {
            Some(Ok(chunk)) if !chunk.is_empty() => Ok(()),
            Some(Err(err)) => Err(ProbeError::Network(err)),
            _ => Err(ProbeError::EmptyBody),
        }
    }
}

#[async_trait]
impl LivenessProbe for HealthVerifier {
    async fn is_alive(&self, url: &str) -> bool {
        self.verify(url, self.timeout).await
    }
}
