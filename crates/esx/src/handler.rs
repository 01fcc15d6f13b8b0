//! 🤝 handler — what the exporter hands you, and how you answer.
//!
//! Every hit's `_source` arrives as raw bytes, in response order, one call at a time.
//! The exporter waits for each answer before moving on, so a slow handler slows the
//! whole export down. That is the backpressure. There is no other.
//!
//! ⚠️ The payload borrows the page buffer. Copy it if you need it after returning.

use async_trait::async_trait;

/// 📄 One document, exactly as the backend sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    /// 📦 The `_source` object, byte for byte. Not parsed, not re-encoded, not judged.
    pub payload: &'a [u8],
    /// 🔢 Zero-based position across the whole session. Contiguous, no gaps.
    pub index: u64,
    /// 🎯 `hits.total` from the page this document came from
    pub total_matches: u64,
}

/// 🚦 The handler's verdict on a document.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// ✅ Keep going
    Continue,
    /// 🛑 Stop cleanly. Not an error. The session ends with `StopReason::Cancelled`.
    Cancel,
    /// 💀 Stop loudly. The session ends with `ExportError::Handler`.
    Fail(anyhow::Error),
}

/// 🤝 Receives documents from an export session.
#[async_trait]
pub trait DocumentHandler: Send {
    async fn handle(&mut self, doc: Document<'_>) -> HandlerOutcome;
}

/// 🔧 Wraps a plain synchronous closure as a [`DocumentHandler`].
///
/// ```
/// use esx::handler::{handler_fn, HandlerOutcome};
///
/// let mut seen = 0usize;
/// let _handler = handler_fn(move |_doc| {
///     seen += 1;
///     HandlerOutcome::Continue
/// });
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(Document<'_>) -> HandlerOutcome + Send,
{
    FnHandler(f)
}

/// 🔧 See [`handler_fn`].
#[derive(Debug)]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> DocumentHandler for FnHandler<F>
where
    F: FnMut(Document<'_>) -> HandlerOutcome + Send,
{
    async fn handle(&mut self, doc: Document<'_>) -> HandlerOutcome {
        (self.0)(doc)
    }
}
