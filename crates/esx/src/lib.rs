//! 🦀 esx — scroll an Elasticsearch index out to wherever you need it, one `_source` at a time.
//!
//! The core ([`exporter`], [`extract`], [`estimate`]) never deserializes a document. It finds
//! each hit's `_source` in the response bytes and hands that exact slice to a
//! [`DocumentHandler`](handler::DocumentHandler). What the handler does with it is its business.
//!
//! ```no_run
//! use esx::config::ExportConfig;
//! use esx::exporter::Exporter;
//! use esx::handler::{handler_fn, HandlerOutcome};
//! use esx::transport::{ElasticsearchConfig, HttpTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let transport = HttpTransport::new(ElasticsearchConfig::new("http://localhost:9200"))?;
//! let exporter = Exporter::new(transport, ExportConfig::for_index("logs").resolve()?);
//! let mut bytes = 0usize;
//! let summary = exporter
//!     .run(
//!         &mut handler_fn(|doc| {
//!             bytes += doc.payload.len();
//!             HandlerOutcome::Continue
//!         }),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{} docs, {} bytes", summary.emitted, bytes);
//! # Ok(())
//! # }
//! ```

pub mod app_config;
pub mod config;
pub mod error;
pub mod estimate;
pub mod exporter;
pub mod extract;
pub mod handler;
pub mod pool;
pub mod progress;
pub mod scan;
pub mod sink;
pub mod transport;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::app_config::AppConfig;
use crate::exporter::{ExportSummary, Exporter};
use crate::progress::ProgressMetrics;
use crate::sink::FileSink;
use crate::transport::HttpTransport;

/// 🚀 Export `[export]` from `[elasticsearch]` into `[output]`. The whole app, basically.
///
/// The output file is closed (and the gzip footer written) even when the export fails,
/// so whatever made it out before the failure is still readable.
pub async fn run(app_config: AppConfig, cancel: CancellationToken) -> Result<ExportSummary> {
    let settings = app_config.export.resolve()?;
    let transport = HttpTransport::new(app_config.elasticsearch.clone())
        .context("💀 Could not set up the Elasticsearch client")?;

    let progress = if app_config.output.progress {
        ProgressMetrics::new(settings.index.clone())
    } else {
        ProgressMetrics::hidden(settings.index.clone())
    };
    let mut sink = FileSink::create(&app_config.output, progress).await?;

    let exporter = Exporter::new(transport, settings);
    let exported = exporter.run(&mut sink, &cancel).await;
    let closed = sink.close().await;

    let summary = exported.with_context(|| {
        format!(
            "💀 Export from '{}' at {} failed",
            exporter.settings().index,
            app_config.elasticsearch.url
        )
    })?;
    closed?;
    Ok(summary)
}
