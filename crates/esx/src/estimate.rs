//! 📏 estimate — how many documents fit in a page of roughly N bytes?
//!
//! 🎬 *[one index has 200-byte log lines. the next has 4 MB PDFs with base64 attachments.
//! a fixed page size of 1000 is fine for one of them.]*
//!
//! So before the first real page we ask for a tiny sample, measure the whole response,
//! and divide. The average includes the envelope (`_shards`, `_id`, `_score`, ...) which
//! slightly overestimates per-doc cost. That is the safe direction to be wrong in.
//!
//! The probe has no `scroll` parameter, so it leaves nothing open on the cluster.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PageSizeBounds;
use crate::error::ExportError;
use crate::extract;
use crate::pool::BufferPool;
use crate::transport::{BackendRequest, Transport};

/// 🧪 Documents requested by the probe
pub const PROBE_SAMPLE_DOCS: usize = 10;
/// 🤷 Average doc size assumed when the probe response is somehow zero bytes
pub const FALLBACK_AVG_DOC_BYTES: usize = 1024;

/// 🧮 `floor(target / (response_bytes / sample_docs))`, clamped to `bounds`.
///
/// Computed as `floor(target * sample_docs / response_bytes)` in 128-bit so the
/// division by a fractional average never happens. Under one byte per doc the average
/// is floored to 1, which makes the cardinality `target_bytes` before clamping.
pub fn page_cardinality(
    response_bytes: usize,
    sample_docs: usize,
    target_bytes: usize,
    bounds: PageSizeBounds,
) -> usize {
    let raw = if response_bytes == 0 || sample_docs == 0 {
        target_bytes / FALLBACK_AVG_DOC_BYTES
    } else if response_bytes < sample_docs {
        target_bytes
    } else {
        let exact = (target_bytes as u128 * sample_docs as u128) / response_bytes as u128;
        usize::try_from(exact).unwrap_or(usize::MAX)
    };
    raw.clamp(bounds.min, bounds.max)
}

/// 📏 Issue the probe and turn it into a page size.
///
/// Same failure rules as a real page: transport errors, non-2xx, shard failures and
/// structural problems all end the session. A probe that matches nothing can't tell us
/// anything about document size and is an `Estimation` error.
pub async fn estimate_page_size<T: Transport>(
    transport: &T,
    probe: &BackendRequest,
    pool: &BufferPool,
    target_bytes: usize,
    bounds: PageSizeBounds,
    cancel: &CancellationToken,
) -> Result<usize, ExportError> {
    let mut buf = pool.acquire();
    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ExportError::Aborted),
        status = transport.send(probe, &mut buf) => status?,
    };
    if !(200..300).contains(&status) {
        return Err(ExportError::Status {
            status,
            body: String::from_utf8_lossy(&buf).into_owned(),
        });
    }

    let results = extract::extract_results(&buf)?;
    if results.shards_failed > 0 {
        return Err(ExportError::ShardFailure {
            failed: results.shards_failed,
        });
    }
    let mut sample_docs = 0usize;
    for hit in results.hits {
        hit?;
        sample_docs += 1;
    }
    if sample_docs == 0 {
        return Err(ExportError::Estimation {
            reason: format!(
                "the probe matched no documents (hits.total = {}), nothing to measure",
                results.total_matches
            ),
        });
    }

    let page_size = page_cardinality(buf.len(), sample_docs, target_bytes, bounds);
    debug!(
        "📏 probe: {} docs in {} bytes, target {} bytes → {} docs per page",
        sample_docs,
        buf.len(),
        target_bytes,
        page_size
    );
    Ok(page_size)
}
