//! 🧪 InMemoryTransport — a cluster that only exists in your imagination (and in a VecDeque).
//!
//! POSTs get the next scripted response, in order. DELETEs (scroll releases) are
//! acknowledged automatically, unless you asked for them to fail. Every request is
//! written down so tests can count calls and peek at bodies afterwards.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use tracing::trace;

use super::{BackendRequest, Transport};
use crate::error::ExportError;

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    script: Mutex<VecDeque<(u16, Vec<u8>)>>,
    requests: Mutex<Vec<BackendRequest>>,
    fail_release: bool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📜 Queue a response for the next POST.
    pub fn respond(self, status: u16, body: impl Into<Vec<u8>>) -> Self {
        lock(&self.script).push_back((status, body.into()));
        self
    }

    /// 💥 Make every DELETE fail at the transport level.
    pub fn with_release_failure(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// 📋 Everything sent so far, in order.
    pub fn requests(&self) -> Vec<BackendRequest> {
        lock(&self.requests).clone()
    }

    /// 🗑️ Just the scroll releases.
    pub fn releases(&self) -> Vec<BackendRequest> {
        lock(&self.requests)
            .iter()
            .filter(|request| request.method == Method::DELETE)
            .cloned()
            .collect()
    }

    /// 📜 Scripted responses nobody asked for yet.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, request: &BackendRequest, body_out: &mut Vec<u8>) -> Result<u16, ExportError> {
        lock(&self.requests).push(request.clone());
        trace!("🧪 {} {} (in memory)", request.method, request.path);

        if request.method == Method::DELETE {
            if self.fail_release {
                return Err(ExportError::transport("🧪 scripted release failure"));
            }
            body_out.extend_from_slice(br#"{"succeeded":true,"num_freed":1}"#);
            return Ok(200);
        }

        let (status, body) = lock(&self.script).pop_front().ok_or_else(|| {
            ExportError::transport(format!(
                "🧪 the script ran out of responses at {} {}",
                request.method, request.path
            ))
        })?;
        body_out.extend_from_slice(&body);
        Ok(status)
    }
}
