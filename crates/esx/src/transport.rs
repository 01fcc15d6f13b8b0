//! 🔌 transport — the one seam between the exporter and the network.
//!
//! 🚰 The exporter decides WHAT to ask (search, continue scroll, release scroll). A
//! `Transport` decides HOW the bytes get there and back. Method, path, query params, a JSON
//! body in; a status code and the raw response bytes out. That's the whole contract.
//!
//! Two implementations live here:
//! - [`HttpTransport`]: reqwest, auth, timeouts. The one production uses.
//! - [`InMemoryTransport`]: a script of canned responses. The one tests use, and the one
//!   you reach for when you want to exercise a handler without a cluster in the room.
//!
//! The response body is written into a buffer the caller owns (a pooled one, in practice),
//! so the transport never decides how memory gets reused. 🦆

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::ExportError;

mod http;
mod in_mem;

pub use http::{ElasticsearchConfig, HttpTransport};
pub use in_mem::InMemoryTransport;

/// 📨 Everything needed to make one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    /// 📍 Absolute path, e.g. `/logs/_search` or `/_search/scroll`
    pub path: String,
    pub query: Vec<(String, String)>,
    /// 📦 Serialized as JSON when present
    pub body: Option<Value>,
}

impl BackendRequest {
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// 🔌 A request/response call to the search backend.
///
/// # Contract 📜
/// - Append the raw response body to `body_out` (it arrives empty) and return the status.
/// - A non-2xx status is NOT an error at this layer; the exporter decides what it means.
/// - Failing to complete the round trip at all is `ExportError::Transport`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: &BackendRequest, body_out: &mut Vec<u8>) -> Result<u16, ExportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &BackendRequest, body_out: &mut Vec<u8>) -> Result<u16, ExportError> {
        (**self).send(request, body_out).await
    }
}
