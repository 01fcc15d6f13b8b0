//! 🔧 config — from "whatever the user typed" to "what the exporter will actually do".
//!
//! [`ExportConfig`] is the raw shape that comes out of TOML / env vars, mostly optional.
//! [`ExportConfig::resolve`] fills in every default, checks the numbers make sense, and
//! hands back an [`ExportSettings`] that nobody touches again for the rest of the session.
//!
//! Defaults, for the record:
//! - keep-alive `1m`
//! - query `{"match_all":{}}`
//! - page budget 10 MiB, page size bounds `[10, 10_000]`
//! - type `_doc`, but only if `legacy_type_path` says the cluster wants one in the URL

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::ExportError;

pub const DEFAULT_KEEP_ALIVE: &str = "1m";
pub const DEFAULT_TARGET_PAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MIN_PAGE_DOCS: usize = 10;
pub const DEFAULT_MAX_PAGE_DOCS: usize = 10_000;
pub const DEFAULT_DOC_TYPE: &str = "_doc";

/// 📦 Raw export options, as written in `[export]`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    /// 🎯 Index (or alias, or comma list, or pattern). The only thing you must say.
    pub index: String,
    /// 🏷️ Mapping type for pre-7 clusters. Implies `legacy_type_path`.
    #[serde(default)]
    pub doc_type: Option<String>,
    /// 🦕 Put a type segment in the search path (`/{index}/{type}/_search`)
    #[serde(default)]
    pub legacy_type_path: bool,
    /// ⏱️ Scroll keep-alive, in ES duration syntax (`30s`, `1m`, `5m`)
    #[serde(default)]
    pub scroll: Option<String>,
    /// 🔍 Query DSL, passed through untouched
    #[serde(default)]
    pub query: Option<Value>,
    /// 📏 Fixed documents per page. Skips the size probe entirely.
    #[serde(default)]
    pub batch_docs: Option<usize>,
    /// 📦 Target response size per page, in bytes
    #[serde(default)]
    pub target_page_bytes: Option<usize>,
    #[serde(default)]
    pub min_page_docs: Option<usize>,
    #[serde(default)]
    pub max_page_docs: Option<usize>,
    /// 🎯 Ask ES 7+ for an exact `hits.total` instead of the 10k lower bound
    #[serde(default)]
    pub track_total_hits: bool,
}

/// 📐 Lower and upper bound on an estimated page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizeBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for PageSizeBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PAGE_DOCS,
            max: DEFAULT_MAX_PAGE_DOCS,
        }
    }
}

/// 📏 How many documents to ask for per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSizing {
    /// 🔢 Exactly this many, every time. Not clamped.
    Fixed(usize),
    /// 📦 Probe once, then size pages to land near `target_bytes`.
    Budget { target_bytes: usize, bounds: PageSizeBounds },
}

/// ✅ Resolved, validated, immutable. What an `Exporter` runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub index: String,
    pub doc_type: Option<String>,
    pub keep_alive: String,
    pub query: Value,
    pub sizing: PageSizing,
    pub track_total_hits: bool,
}

impl ExportConfig {
    /// 🏗️ Shortcut for the common case: this index, everything else default.
    pub fn for_index(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            ..Self::default()
        }
    }

    /// 🔧 Fill in defaults and validate. Pure, apart from one warning.
    pub fn resolve(&self) -> Result<ExportSettings, ExportError> {
        let index = self.index.trim();
        if index.is_empty() {
            return Err(ExportError::InvalidSettings(
                "export.index is empty. Exporting from nowhere is very fast but not very useful.".into(),
            ));
        }

        let keep_alive = self
            .scroll
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_KEEP_ALIVE);
        if keep_alive.is_empty() {
            return Err(ExportError::InvalidSettings("export.scroll is empty".into()));
        }

        let doc_type = match (&self.doc_type, self.legacy_type_path) {
            (Some(doc_type), _) if !doc_type.trim().is_empty() => Some(doc_type.trim().to_string()),
            (_, true) => Some(DEFAULT_DOC_TYPE.to_string()),
            _ => None,
        };

        let sizing = match self.batch_docs {
            Some(0) => {
                return Err(ExportError::InvalidSettings("export.batch_docs must be at least 1".into()));
            }
            Some(batch_docs) => {
                if self.target_page_bytes.is_some() {
                    // -- both set: the explicit count wins, the byte budget goes home early
                    warn!(
                        "⚠️ both batch_docs ({}) and target_page_bytes are set; using the fixed page size",
                        batch_docs
                    );
                }
                PageSizing::Fixed(batch_docs)
            }
            None => {
                let target_bytes = self.target_page_bytes.unwrap_or(DEFAULT_TARGET_PAGE_BYTES);
                if target_bytes == 0 {
                    return Err(ExportError::InvalidSettings(
                        "export.target_page_bytes must be at least 1".into(),
                    ));
                }
                let bounds = PageSizeBounds {
                    min: self.min_page_docs.unwrap_or(DEFAULT_MIN_PAGE_DOCS),
                    max: self.max_page_docs.unwrap_or(DEFAULT_MAX_PAGE_DOCS),
                };
                if bounds.min == 0 || bounds.min > bounds.max {
                    return Err(ExportError::InvalidSettings(format!(
                        "page size bounds must satisfy 1 <= min <= max, got min={} max={}",
                        bounds.min, bounds.max
                    )));
                }
                PageSizing::Budget { target_bytes, bounds }
            }
        };

        Ok(ExportSettings {
            index: index.to_string(),
            doc_type,
            keep_alive: keep_alive.to_string(),
            query: self.query.clone().unwrap_or_else(|| json!({"match_all": {}})),
            sizing,
            track_total_hits: self.track_total_hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_an_index_is_all_you_need() {
        let settings = ExportConfig::for_index("logs").resolve().unwrap();
        assert_eq!(settings.index, "logs");
        assert_eq!(settings.doc_type, None);
        assert_eq!(settings.keep_alive, "1m");
        assert_eq!(settings.query, json!({"match_all": {}}));
        assert_eq!(
            settings.sizing,
            PageSizing::Budget {
                target_bytes: 10 * 1024 * 1024,
                bounds: PageSizeBounds { min: 10, max: 10_000 }
            }
        );
        assert!(!settings.track_total_hits);
    }

    #[test]
    fn the_one_where_legacy_clusters_get_a_doc_type() {
        let config = ExportConfig {
            legacy_type_path: true,
            ..ExportConfig::for_index("old")
        };
        assert_eq!(config.resolve().unwrap().doc_type.as_deref(), Some("_doc"));

        let config = ExportConfig {
            doc_type: Some("tweet".into()),
            ..ExportConfig::for_index("old")
        };
        assert_eq!(config.resolve().unwrap().doc_type.as_deref(), Some("tweet"));
    }

    #[test]
    fn the_one_where_batch_docs_beats_the_byte_budget() {
        let config = ExportConfig {
            batch_docs: Some(500),
            target_page_bytes: Some(1024),
            ..ExportConfig::for_index("logs")
        };
        assert_eq!(config.resolve().unwrap().sizing, PageSizing::Fixed(500));
    }

    #[test]
    fn the_one_where_nonsense_numbers_are_refused() {
        let cases = [
            ExportConfig::for_index("   "),
            ExportConfig {
                scroll: Some(" ".into()),
                ..ExportConfig::for_index("logs")
            },
            ExportConfig {
                batch_docs: Some(0),
                ..ExportConfig::for_index("logs")
            },
            ExportConfig {
                target_page_bytes: Some(0),
                ..ExportConfig::for_index("logs")
            },
            ExportConfig {
                min_page_docs: Some(0),
                ..ExportConfig::for_index("logs")
            },
            ExportConfig {
                min_page_docs: Some(500),
                max_page_docs: Some(100),
                ..ExportConfig::for_index("logs")
            },
        ];
        for config in cases {
            let err = config.resolve().unwrap_err();
            assert!(matches!(err, ExportError::InvalidSettings(_)), "{config:?} gave {err:?}");
        }
    }

    #[test]
    fn the_one_where_custom_queries_pass_straight_through() {
        let query = json!({"term": {"level": "error"}});
        let config = ExportConfig {
            query: Some(query.clone()),
            scroll: Some("5m".into()),
            track_total_hits: true,
            ..ExportConfig::for_index("logs")
        };
        let settings = config.resolve().unwrap();
        assert_eq!(settings.query, query);
        assert_eq!(settings.keep_alive, "5m");
        assert!(settings.track_total_hits);
    }
}
