//! 📡 HttpTransport — reqwest, pointed at a cluster, asked nicely.
//!
//! 🎬 *[the cluster is GREEN. for now.]*
//!
//! The client is built once per session with a connect timeout and a request timeout,
//! then reused for every page, because spinning up a new client per request is the
//! networking equivalent of buying a new car every time you need groceries.
//!
//! 🔒 Auth follows the same pecking order as ever: API key beats basic auth, and if you
//! configured neither, we go anonymous and hope the cluster is the trusting type.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::trace;

use super::{BackendRequest, Transport};
use crate::error::ExportError;

/// 📡 Where the cluster lives and how to get in.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 Scheme + host + port. Yes, all of it. A path prefix is fine too.
    pub url: String,
    /// 🔒 Basic auth username. Optional, like flossing.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Basic auth password. If this is plaintext in a committed file, we need to talk.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key — preferred over basic auth when both are set
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ TCP/TLS handshake budget
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request budget. Pages can be big; be generous.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// -- 10 seconds to shake hands. if ES can't manage that, neither can we.
fn default_connect_timeout_secs() -> u64 {
    10
}

// -- a 10 MiB page over a sad link takes a while
fn default_request_timeout_secs() -> u64 {
    120
}

impl ElasticsearchConfig {
    /// 🏗️ Just a URL, everything else defaulted. Handy in tests.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 📡 The production transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    config: ElasticsearchConfig,
}

impl HttpTransport {
    /// 🚀 Build the client. Fails on an unparseable URL or a TLS stack having a bad day.
    pub fn new(config: ElasticsearchConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.url).with_context(|| {
            format!(
                "💀 '{}' is not a URL we can work with. Include the scheme, e.g. http://localhost:9200",
                config.url
            )
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Either way: tragic.")?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn url_for(&self, request: &BackendRequest) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, request.path));
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url
    }
}

/// 📏 Up-front reservation cap. Past this the body grows the usual way, one chunk at a time.
const MAX_RESERVE_BYTES: usize = 64 * 1024 * 1024;

/// 📏 How much to reserve for a body of the advertised `Content-Length`. The header is the
/// server's word, not a fact, so it never gets to ask for more than [`MAX_RESERVE_BYTES`].
fn reservation(content_length: Option<u64>) -> usize {
    content_length.map_or(0, |len| {
        usize::try_from(len).map_or(MAX_RESERVE_BYTES, |len| len.min(MAX_RESERVE_BYTES))
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &BackendRequest, body_out: &mut Vec<u8>) -> Result<u16, ExportError> {
        let url = self.url_for(request);
        trace!("📡 {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(ref body) = request.body {
            let bytes = serde_json::to_vec(body).map_err(ExportError::transport)?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }
        // 🔒 api_key wins. this is not a democracy.
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header(AUTHORIZATION, format!("ApiKey {}", api_key));
        } else if let Some(ref username) = self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        let mut response = builder.send().await.map_err(ExportError::transport)?;
        let status = response.status().as_u16();

        body_out.reserve(reservation(response.content_length()));
        // -- stream the body straight into the caller's buffer, chunk by chunk
        while let Some(chunk) = response.chunk().await.map_err(ExportError::transport)? {
            body_out.extend_from_slice(&chunk);
        }
        trace!("📦 {} bytes back with HTTP {}", body_out.len(), status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_path_prefixes_survive() {
        let transport = HttpTransport::new(ElasticsearchConfig::new("http://localhost:9200/es/")).unwrap();
        let request = BackendRequest::post("/logs/_search", json!({})).with_query("scroll", "1m");
        let url = transport.url_for(&request);
        assert_eq!(url.as_str(), "http://localhost:9200/es/logs/_search?scroll=1m");
    }

    #[test]
    fn the_one_where_a_bare_host_works_too() {
        let transport = HttpTransport::new(ElasticsearchConfig::new("http://localhost:9200")).unwrap();
        let request = BackendRequest::delete("/_search/scroll", json!({"scroll_id": "abc"}));
        assert_eq!(
            transport.url_for(&request).as_str(),
            "http://localhost:9200/_search/scroll"
        );
    }

    #[test]
    fn the_one_where_a_schemeless_url_is_turned_away() {
        let err = HttpTransport::new(ElasticsearchConfig::new("just-a-hostname")).unwrap_err();
        assert!(err.to_string().contains("not a URL"), "got: {err}");
    }

    #[test]
    fn the_one_where_content_length_is_believed_only_so_far() {
        assert_eq!(reservation(None), 0);
        assert_eq!(reservation(Some(4096)), 4096);
        assert_eq!(reservation(Some(MAX_RESERVE_BYTES as u64)), MAX_RESERVE_BYTES);
        // -- a bogus header must not turn into a capacity overflow or a 16 EiB allocation
        assert_eq!(reservation(Some(u64::MAX)), MAX_RESERVE_BYTES);

        let mut body: Vec<u8> = Vec::new();
        body.reserve(reservation(Some(u64::MAX)));
        assert!(body.capacity() >= MAX_RESERVE_BYTES);
    }
}
