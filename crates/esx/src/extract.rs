//! 📄 extract — pull the four fields we care about out of a search response, and walk the hits.
//!
//! 🎬 *[INT. RESPONSE BUFFER — NIGHT. Thousands of documents, and we want exactly one field of each.]*
//!
//! A scroll page looks roughly like this (the rest of it is none of our business):
//!
//! ```text
//! {
//!   "_scroll_id": "DXF1ZXJ5QW5kRmV0Y2gBAAAAAAAAAD4WYm9laVYtZndUQlNsdDcwakFMNjU1QQ==",
//!   "_shards": { "total": 5, "successful": 5, "failed": 0 },
//!   "hits": {
//!     "total": 1337,                       // ES 6 style
//!     "total": { "value": 1337, ... },     // ES 7+ style — both are accepted
//!     "hits": [ { "_id": "1", "_source": { ...the payload... } }, ... ]
//!   }
//! }
//! ```
//!
//! Everything top-level is located and type-checked BEFORE the first hit comes out, so a page
//! that is broken at the top never reaches the handler. Per-hit problems surface as the
//! iterator reaches them, and the exporter treats them as fatal for the whole session. 🦆

use std::borrow::Cow;

use crate::error::{StructuralError, StructuralErrorKind, ValueKind};
use crate::scan::{self, ArrayElements, RawValue};

const SCROLL_ID: &str = "_scroll_id";
const SHARDS_FAILED: &str = "_shards.failed";
const HITS_TOTAL: &str = "hits.total";
const HITS_HITS: &str = "hits.hits";

/// 📄 One scroll page: the renewed cursor token plus the results.
#[derive(Debug)]
pub struct Page<'a> {
    pub scroll_id: Cow<'a, str>,
    pub results: SearchResults<'a>,
}

/// 📊 The part of a search response that doesn't care whether a scroll is involved.
#[derive(Debug)]
pub struct SearchResults<'a> {
    /// 🧩 `_shards.failed` — anything but zero means the page is incomplete
    pub shards_failed: u64,
    /// 🎯 `hits.total` — the backend's count of matching documents, as of this page
    pub total_matches: u64,
    /// 🚶 Lazy walk over `hits.hits`, yielding each `_source` span
    pub hits: Hits<'a>,
}

/// 🚶 Iterator over the `_source` byte ranges of `hits.hits`, in order.
#[derive(Debug)]
pub struct Hits<'a> {
    elements: ArrayElements<'a>,
}

impl<'a> Iterator for Hits<'a> {
    type Item = Result<&'a [u8], StructuralError>;

    fn next(&mut self) -> Option<Self::Item> {
        let element = match self.elements.next()? {
            Ok(element) => element,
            Err(err) => return Some(Err(err)),
        };
        Some(source_of(element, &self.elements))
    }
}

fn source_of<'a>(hit: RawValue<'a>, elements: &ArrayElements<'a>) -> Result<&'a [u8], StructuralError> {
    if hit.kind() != ValueKind::Object {
        return Err(StructuralError::wrong_type(
            elements.current_path(),
            ValueKind::Object,
            hit.kind(),
        ));
    }
    // -- the path is only formatted when something goes wrong; the happy path stays allocation-free
    let source = hit
        .find("", &["_source"])
        .map_err(|err| rebase(err, &elements.current_path()))?;
    if source.kind() != ValueKind::Object {
        return Err(StructuralError::wrong_type(
            format!("{}._source", elements.current_path()),
            ValueKind::Object,
            source.kind(),
        ));
    }
    Ok(source.as_bytes())
}

fn rebase(mut err: StructuralError, base: &str) -> StructuralError {
    err.path = if err.path == "$" {
        base.to_string()
    } else {
        format!("{base}.{}", err.path)
    };
    err
}

/// 📄 Extract a full scroll page: `_scroll_id`, `_shards.failed`, `hits.total`, `hits.hits`.
///
/// The top level is walked once for all three members, and `hits` once for both of its own.
pub fn extract_page(buf: &[u8]) -> Result<Page<'_>, StructuralError> {
    let [scroll_id, shards, hits] = scan::root(buf)?.members("", [SCROLL_ID, "_shards", "hits"])?;
    let scroll_id = scroll_id_of(scroll_id)?;
    let results = results_of(shards, hits)?;
    Ok(Page { scroll_id, results })
}

/// 🔑 Only the cursor token. Must be a non-empty string.
pub fn extract_scroll_id(buf: &[u8]) -> Result<Cow<'_, str>, StructuralError> {
    let [scroll_id] = scan::root(buf)?.members("", [SCROLL_ID])?;
    scroll_id_of(scroll_id)
}

/// 📊 Shards, total and hits, without requiring a scroll id (the size probe opens no scroll).
pub fn extract_results(buf: &[u8]) -> Result<SearchResults<'_>, StructuralError> {
    let [shards, hits] = scan::root(buf)?.members("", ["_shards", "hits"])?;
    results_of(shards, hits)
}

fn scroll_id_of(value: Option<RawValue<'_>>) -> Result<Cow<'_, str>, StructuralError> {
    let scroll_id = value
        .ok_or_else(|| StructuralError::missing(SCROLL_ID))?
        .as_str(SCROLL_ID)?;
    if scroll_id.is_empty() {
        return Err(StructuralError::new(SCROLL_ID, StructuralErrorKind::Empty));
    }
    Ok(scroll_id)
}

fn results_of<'a>(
    shards: Option<RawValue<'a>>,
    hits: Option<RawValue<'a>>,
) -> Result<SearchResults<'a>, StructuralError> {
    let shards_failed = shards
        .ok_or_else(|| StructuralError::missing("_shards"))?
        .find("_shards", &["failed"])?
        .as_u64(SHARDS_FAILED)?;

    let [total, hit_array] = hits
        .ok_or_else(|| StructuralError::missing("hits"))?
        .members("hits", ["total", "hits"])?;
    let total = total.ok_or_else(|| StructuralError::missing(HITS_TOTAL))?;
    let total_matches = match total.kind() {
        ValueKind::Number => total.as_u64(HITS_TOTAL)?,
        // -- ES 7 moved this to {"value": n, "relation": "eq"|"gte"}
        ValueKind::Object => total
            .find(HITS_TOTAL, &["value"])?
            .as_u64("hits.total.value")?,
        other => {
            return Err(StructuralError::wrong_type(HITS_TOTAL, ValueKind::Number, other));
        }
    };

    let elements = hit_array
        .ok_or_else(|| StructuralError::missing(HITS_HITS))?
        .elements(HITS_HITS)?;

    Ok(SearchResults {
        shards_failed,
        total_matches,
        hits: Hits { elements },
    })
}
