//! 🚀 exporter — the scroll loop. Open, page, page, page, release.
//!
//! 🎬 *[COLD OPEN — a cluster with forty million documents and one very patient cursor.]*
//!
//! ```text
//!   [size probe]  ─┐   only in byte-budget mode
//!                  ▼
//!   POST /{index}[/{type}]/_search?scroll=1m   {size, query, sort:[_doc]}
//!                  │
//!                  ▼
//!   POST /_search/scroll   {scroll, scroll_id}  ◄──┐
//!                  │                               │ page had hits
//!                  ├───────────────────────────────┘
//!                  ▼ empty page / cancel / error
//!   DELETE /_search/scroll   {scroll_id}   best effort, errors swallowed, 5 s at most
//! ```
//!
//! Every page becomes a [`PageOutcome`], and the loop is one `match` on it. Nothing is
//! retried. The only state that survives between pages is the [`ExportSession`]:
//! the latest scroll id, the emission counter, and the last `hits.total`. 🦆

use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ExportSettings, PageSizing};
use crate::error::ExportError;
use crate::estimate::{self, PROBE_SAMPLE_DOCS};
use crate::extract;
use crate::handler::{Document, DocumentHandler, HandlerOutcome};
use crate::pool::BufferPool;
use crate::transport::{BackendRequest, Transport};

const SCROLL_PATH: &str = "/_search/scroll";
/// ⏱️ How long the release may take. It also runs after an abort, when nobody wants to wait.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// 🏁 Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 📭 A page came back empty. Everything that matched has been delivered.
    Exhausted,
    /// 🛑 The handler said stop.
    Cancelled,
}

/// 📊 What happened, for the log line at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// ✅ Documents the handler accepted with `Continue`
    pub emitted: u64,
    /// 🎯 `hits.total` from the last page we saw
    pub total_matches: u64,
    /// 📄 Pages received, including the final empty one
    pub pages: u64,
    /// 📏 Documents requested per page
    pub page_size: usize,
    pub stop: StopReason,
}

/// 🚦 The result of fetching and dispatching one page.
#[derive(Debug)]
enum PageOutcome {
    Continue,
    Cancelled,
    Exhausted,
    Failed(ExportError),
}

/// 🧠 Mutable state of one `run`. Lives exactly as long as the call.
#[derive(Debug)]
struct ExportSession {
    scroll_id: String,
    emitted: u64,
    total_matches: u64,
    pages: u64,
    page_size: usize,
}

impl ExportSession {
    fn new(page_size: usize) -> Self {
        Self {
            scroll_id: String::new(),
            emitted: 0,
            total_matches: 0,
            pages: 0,
            page_size,
        }
    }

    fn summary(&self, stop: StopReason) -> ExportSummary {
        ExportSummary {
            emitted: self.emitted,
            total_matches: self.total_matches,
            pages: self.pages,
            page_size: self.page_size,
            stop,
        }
    }
}

/// 🚀 Scroll exporter over some [`Transport`].
///
/// One `Exporter` can `run` any number of sessions, one after another or side by side;
/// each run gets its own scroll cursor and its own counters.
#[derive(Debug)]
pub struct Exporter<T> {
    transport: T,
    settings: ExportSettings,
    pool: BufferPool,
}

impl<T: Transport> Exporter<T> {
    pub fn new(transport: T, settings: ExportSettings) -> Self {
        Self {
            transport,
            settings,
            pool: BufferPool::default(),
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// 🚀 Export everything the query matches, one document at a time, into `handler`.
    ///
    /// Returns `Ok` when the matches run out or the handler cancels, and the first fatal
    /// error otherwise. Firing `cancel` aborts whatever request is in flight and returns
    /// [`ExportError::Aborted`]. If a scroll was opened, one release is attempted on the way
    /// out no matter how we leave, and it gets at most [`RELEASE_TIMEOUT`].
    pub async fn run<H>(&self, handler: &mut H, cancel: &CancellationToken) -> Result<ExportSummary, ExportError>
    where
        H: DocumentHandler + ?Sized,
    {
        let page_size = match &self.settings.sizing {
            PageSizing::Fixed(page_size) => *page_size,
            PageSizing::Budget { target_bytes, bounds } => {
                estimate::estimate_page_size(
                    &self.transport,
                    &self.probe_request(),
                    &self.pool,
                    *target_bytes,
                    *bounds,
                    cancel,
                )
                .await?
            }
        };
        info!(
            "🚀 exporting from '{}' with {} docs per page, scroll keep-alive {}",
            self.settings.index, page_size, self.settings.keep_alive
        );

        let mut session = ExportSession::new(page_size);
        let result = self.drive(&mut session, handler, cancel).await;

        if !session.scroll_id.is_empty() {
            self.release(&session.scroll_id).await;
        }

        let stop = result?;
        let summary = session.summary(stop);
        info!(
            "🏁 export from '{}' finished ({:?}): {} of {} docs in {} pages",
            self.settings.index, summary.stop, summary.emitted, summary.total_matches, summary.pages
        );
        Ok(summary)
    }

    async fn drive<H>(
        &self,
        session: &mut ExportSession,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Result<StopReason, ExportError>
    where
        H: DocumentHandler + ?Sized,
    {
        loop {
            match self.next_page(session, handler, cancel).await {
                PageOutcome::Continue => {}
                PageOutcome::Exhausted => return Ok(StopReason::Exhausted),
                PageOutcome::Cancelled => return Ok(StopReason::Cancelled),
                PageOutcome::Failed(err) => return Err(err),
            }
        }
    }

    async fn next_page<H>(
        &self,
        session: &mut ExportSession,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> PageOutcome
    where
        H: DocumentHandler + ?Sized,
    {
        let request = if session.scroll_id.is_empty() {
            self.first_request(session.page_size)
        } else {
            self.next_request(&session.scroll_id)
        };
        debug!("📡 page {}: {} {}", session.pages + 1, request.method, request.path);

        let mut buf = self.pool.acquire();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExportError::Aborted),
            sent = self.transport.send(&request, &mut buf) => sent,
        };
        let status = match sent {
            Ok(status) => status,
            Err(err) => return PageOutcome::Failed(err),
        };
        if !(200..300).contains(&status) {
            return PageOutcome::Failed(ExportError::Status {
                status,
                body: String::from_utf8_lossy(&buf).into_owned(),
            });
        }

        let page = match extract::extract_page(&buf) {
            Ok(page) => page,
            Err(err) => {
                // -- the rest of the page is junk, but if the token survived, release that one
                if let Ok(scroll_id) = extract::extract_scroll_id(&buf) {
                    session.scroll_id = scroll_id.into_owned();
                }
                return PageOutcome::Failed(err.into());
            }
        };
        session.scroll_id = page.scroll_id.into_owned();
        session.pages += 1;

        let results = page.results;
        session.total_matches = results.total_matches;
        if results.shards_failed > 0 {
            return PageOutcome::Failed(ExportError::ShardFailure {
                failed: results.shards_failed,
            });
        }

        let mut dispatched = 0usize;
        for hit in results.hits {
            let payload = match hit {
                Ok(payload) => payload,
                Err(err) => return PageOutcome::Failed(err.into()),
            };
            let doc = Document {
                payload,
                index: session.emitted,
                total_matches: results.total_matches,
            };
            match handler.handle(doc).await {
                HandlerOutcome::Continue => {
                    session.emitted += 1;
                    dispatched += 1;
                }
                HandlerOutcome::Cancel => {
                    debug!("🛑 handler cancelled at document {}", session.emitted);
                    return PageOutcome::Cancelled;
                }
                HandlerOutcome::Fail(err) => return PageOutcome::Failed(ExportError::Handler(err.into())),
            }
        }
        trace!(
            "📄 page {} dispatched {} docs ({} of {} so far)",
            session.pages, dispatched, session.emitted, session.total_matches
        );

        if dispatched == 0 {
            PageOutcome::Exhausted
        } else {
            PageOutcome::Continue
        }
    }

    /// 🗑️ Best effort, and bounded. Whatever happens here stays here.
    async fn release(&self, scroll_id: &str) {
        let mut buf = self.pool.acquire();
        let request = self.release_request(scroll_id);
        let sent = tokio::time::timeout(RELEASE_TIMEOUT, self.transport.send(&request, &mut buf)).await;
        match sent {
            Ok(Ok(status)) if (200..300).contains(&status) => debug!("🗑️ scroll released"),
            // -- already expired, or never existed; either way it's gone
            Ok(Ok(404)) => debug!("🗑️ scroll was already gone"),
            Ok(Ok(status)) => warn!(
                "⚠️ scroll release answered HTTP {}: {}. The cluster will expire it on its own.",
                status,
                String::from_utf8_lossy(&buf)
            ),
            Ok(Err(err)) => warn!("⚠️ scroll release failed: {}. The cluster will expire it on its own.", err),
            Err(_) => warn!(
                "⚠️ scroll release got no answer within {:?}. The cluster will expire it on its own.",
                RELEASE_TIMEOUT
            ),
        }
    }

    fn search_path(&self) -> String {
        match &self.settings.doc_type {
            Some(doc_type) => format!("/{}/{}/_search", self.settings.index, doc_type),
            None => format!("/{}/_search", self.settings.index),
        }
    }

    fn search_body(&self, size: usize) -> Value {
        let mut body = json!({
            "size": size,
            "query": self.settings.query,
            // -- _doc order is the cheapest order there is; scrolls don't need relevance
            "sort": ["_doc"],
        });
        if self.settings.track_total_hits {
            body["track_total_hits"] = Value::Bool(true);
        }
        body
    }

    fn first_request(&self, page_size: usize) -> BackendRequest {
        BackendRequest::post(self.search_path(), self.search_body(page_size))
            .with_query("scroll", self.settings.keep_alive.as_str())
    }

    fn next_request(&self, scroll_id: &str) -> BackendRequest {
        BackendRequest::post(
            SCROLL_PATH,
            json!({"scroll": self.settings.keep_alive, "scroll_id": scroll_id}),
        )
    }

    fn release_request(&self, scroll_id: &str) -> BackendRequest {
        BackendRequest::delete(SCROLL_PATH, json!({"scroll_id": scroll_id}))
    }

    fn probe_request(&self) -> BackendRequest {
        BackendRequest::post(self.search_path(), self.search_body(PROBE_SAMPLE_DOCS))
    }
}
