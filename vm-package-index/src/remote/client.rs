use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{IndexError, IndexResult};

/// Redirects followed before a request is abandoned.
pub const MAX_REDIRECTS: usize = 10;

/// One redirect answered on the way to the final response.
#[derive(Debug, Clone)]
pub struct UpstreamRedirect {
    pub url: Url,
    pub status: StatusCode,
    /// Raw `Location` header, possibly relative
    pub location: String,
}

/// Final response of an upstream request, with the redirects that led to it.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub history: Vec<UpstreamRedirect>,
}

impl UpstreamResponse {
    /// Raw `Location` headers in the order they were answered.
    ///
    /// Without redirects this is the final response's own `Location`, if any.
    pub fn redirect_locations(&self) -> Vec<&str> {
        if self.history.is_empty() {
            return self
                .headers
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .into_iter()
                .collect();
        }
        self.history
            .iter()
            .map(|redirect| redirect.location.as_str())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client for the upstream index.
///
/// Redirects are followed by hand so the crawler can see every `Location`
/// header. Transport failures (timeouts, refused connections) surface as
/// [`IndexError::NotFound`] without a status; non-success answers carry the
/// upstream status.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, user_agent: &str) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| IndexError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn from_config(config: &RemoteConfig) -> IndexResult<Self> {
        Self::new(config.timeout(), &config.user_agent)
    }

    /// GET a URL, following redirects, whatever the final status.
    pub async fn fetch(&self, url: &str) -> IndexResult<UpstreamResponse> {
        let mut current = Url::parse(url)
            .map_err(|e| IndexError::not_found(format!("Invalid upstream URL {url}: {e}")))?;
        let mut history = Vec::new();

        loop {
            debug!(url = %current, "Fetching from upstream");
            let response = self.client.get(current.clone()).send().await.map_err(|e| {
                warn!(url = %current, error = %e, "Upstream request failed");
                IndexError::not_found(format!("Unable to reach upstream: {current}"))
            })?;
            let status = response.status();

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            if let (true, Some(location)) = (status.is_redirection(), location) {
                if history.len() >= MAX_REDIRECTS {
                    warn!(url = %url, "Too many upstream redirects");
                    return Err(IndexError::not_found(format!("Too many redirects: {url}")));
                }
                let next = current.join(&location).map_err(|e| {
                    IndexError::not_found(format!("Invalid redirect from {current}: {e}"))
                })?;
                debug!(from = %current, to = %next, status = %status, "Following redirect");
                history.push(UpstreamRedirect {
                    url: current,
                    status,
                    location,
                });
                current = next;
                continue;
            }

            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                warn!(url = %current, error = %e, "Failed to read upstream response");
                IndexError::not_found(format!("Unable to read upstream response: {current}"))
            })?;
            return Ok(UpstreamResponse {
                url: current,
                status,
                headers,
                body,
                history,
            });
        }
    }

    /// GET a URL and require a success status.
    pub async fn get(&self, url: &str) -> IndexResult<UpstreamResponse> {
        let response = self.fetch(url).await?;
        if !response.status.is_success() {
            debug!(url = %url, status = %response.status, "Upstream answered with an error");
            return Err(IndexError::upstream_status(
                format!("Not found upstream: {url} ({})", response.status),
                response.status,
            ));
        }
        Ok(response)
    }
}
