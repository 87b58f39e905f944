use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use super::{MetricsStore, QueryOptions, SearchRequest, SearchResponse, StoreError};

/// Longest response body excerpt carried in a `StoreError::Status`
const ERROR_BODY_PREVIEW: usize = 512;

/// Connection parameters for an OpenSearch metrics data store.
///
/// Passed explicitly to [`OpenSearchStore::new`]; nothing is read from the
/// process environment here. `Default` carries no credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Host name or URL; `https://` is assumed when no scheme is given
    pub host: String,
    /// Used only when `host` carries no port of its own
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index_pattern: String,
    pub max_results: usize,
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: crate::defaults::STORE_PORT,
            username: None,
            password: None,
            index_pattern: crate::defaults::INDEX_PATTERN.to_string(),
            max_results: crate::defaults::MAX_RESULTS,
            timeout: crate::defaults::STORE_TIMEOUT,
            insecure: false,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("index_pattern", &self.index_pattern)
            .field("max_results", &self.max_results)
            .field("timeout", &self.timeout)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl StoreConfig {
    /// Base URL of the store, `scheme://host:port`.
    ///
    /// A port written into `host` wins over `port`.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let (scheme, authority) = match host.split_once("://") {
            Some((scheme, authority)) => (scheme, authority),
            None => ("https", host),
        };
        if has_explicit_port(authority) {
            format!("{}://{}", scheme, authority)
        } else {
            format!("{}://{}:{}", scheme, authority, self.port)
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            index_pattern: self.index_pattern.clone(),
            max_results: self.max_results,
        }
    }
}

/// Whether `authority` ends in `:<port>`; bracketed IPv6 literals are
/// handled, bare ones never carry a port.
fn has_explicit_port(authority: &str) -> bool {
    let tail = match authority.rfind(']') {
        Some(end) => &authority[end + 1..],
        None if authority.matches(':').count() == 1 => authority,
        None => return false,
    };
    match tail.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// `MetricsStore` backed by the OpenSearch `_search` REST endpoint
pub struct OpenSearchStore {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        debug!("Created metrics store client for {}", config.base_url());
        Ok(Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn search_url(&self, request: &SearchRequest) -> String {
        format!(
            "{}/{}/_search?size={}",
            self.base_url, request.index, request.size
        )
    }
}

#[async_trait]
impl MetricsStore for OpenSearchStore {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, StoreError> {
        let mut builder = self
            .client
            .post(self.search_url(request))
            .header(CONTENT_TYPE, "application/json")
            .json(&request.body);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.trim().chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}
