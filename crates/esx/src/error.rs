//! 💀 Errors — the many ways a scroll can go sideways.
//!
//! 🎬 *[a 500 arrives. then a shard failure. then a `hits.hits` that is, somehow, a string.]*
//!
//! The library core speaks in typed errors so callers can tell "the cluster said no"
//! apart from "the cluster said yes, but in the wrong shape". The app layer (config,
//! CLI, file sink) wraps all of this in `anyhow`.
//!
//! Two things are deliberately NOT errors here: the handler asking us to stop, and
//! running out of documents. Those are `StopReason`s over in the exporter. 🦆

use std::fmt;

use thiserror::Error;

/// 🏷️ What kind of JSON value sits at a given position. Decided from the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Bool => "bool",
            ValueKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// 🧱 How a response failed to look like a search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralErrorKind {
    /// 🔍 The field is not there. We looked. Twice.
    Missing,
    /// 🎭 The field is there, wearing the wrong costume.
    WrongType { expected: ValueKind, found: ValueKind },
    /// 🕳️ The field is there and is the right type, but empty where emptiness is illegal.
    Empty,
    /// 💀 The bytes are not JSON at all around `offset`.
    Malformed { offset: usize, reason: &'static str },
}

/// 🧱 A violation of the expected response shape, with the dotted path that broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("💀 response field '{path}' is not what we expected: {kind}")]
pub struct StructuralError {
    /// 📍 e.g. `hits.hits`, `hits.hits[3]._source`, `_shards.failed`
    pub path: String,
    pub kind: StructuralErrorKind,
}

impl StructuralError {
    pub(crate) fn new(path: impl Into<String>, kind: StructuralErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub(crate) fn missing(path: impl Into<String>) -> Self {
        Self::new(path, StructuralErrorKind::Missing)
    }

    pub(crate) fn wrong_type(path: impl Into<String>, expected: ValueKind, found: ValueKind) -> Self {
        Self::new(path, StructuralErrorKind::WrongType { expected, found })
    }

    pub(crate) fn malformed(path: impl Into<String>, offset: usize, reason: &'static str) -> Self {
        Self::new(path, StructuralErrorKind::Malformed { offset, reason })
    }
}

impl fmt::Display for StructuralErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralErrorKind::Missing => f.write_str("missing"),
            StructuralErrorKind::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            StructuralErrorKind::Empty => f.write_str("present but empty"),
            StructuralErrorKind::Malformed { offset, reason } => {
                write!(f, "malformed JSON at byte {offset}: {reason}")
            }
        }
    }
}

/// 💀 Everything that can end an export session with an error.
///
/// Every variant is fatal. Nothing here is retried. The scroll cursor gets a
/// best-effort release on the way out, and then this is what you get back.
#[derive(Debug, Error)]
pub enum ExportError {
    /// 📡 The request never completed: connection refused, timeout, DNS, the usual suspects.
    #[error("💀 transport failure talking to the search backend: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 🚫 The backend answered, with a non-2xx. The body rides along for the postmortem.
    #[error("💀 search backend answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 🧩 Some shards failed. Partial results are not results.
    #[error("💀 {failed} shard(s) failed for this page; refusing to export a partial result set")]
    ShardFailure { failed: u64 },

    /// 🧱 The response did not look like a search response.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// 📏 The size probe could not produce an estimate.
    #[error("💀 could not estimate page size: {reason}")]
    Estimation { reason: String },

    /// 🙅 The handler returned a failure.
    #[error("💀 the document handler bailed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 🛑 The session's cancellation token fired while a request was in flight.
    #[error("🛑 export aborted: the cancellation token fired mid-flight")]
    Aborted,

    /// 🔧 The configuration could not be resolved into usable settings.
    #[error("💀 invalid export settings: {0}")]
    InvalidSettings(String),
}

impl ExportError {
    /// 📡 Wrap anything error-shaped as a transport failure.
    pub fn transport(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ExportError::Transport(source.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_structural_errors_name_their_field() {
        let err = ExportError::from(StructuralError::wrong_type(
            "hits.hits",
            ValueKind::Array,
            ValueKind::String,
        ));
        let msg = err.to_string();
        assert!(msg.contains("hits.hits"), "path must be in the message: {msg}");
        assert!(msg.contains("expected array, found string"), "got: {msg}");
    }

    #[test]
    fn the_one_where_status_errors_keep_the_body() {
        let err = ExportError::Status {
            status: 503,
            body: r#"{"error":"cluster_block_exception"}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("cluster_block_exception"));
    }
}
