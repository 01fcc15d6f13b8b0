//! 🚰 sink — where exported documents land: an NDJSON file, one `_source` per line.
//!
//! Optionally gzipped. Compression runs through `flate2` into an in-memory staging
//! buffer, and the compressed bytes go to disk through the same tokio `BufWriter` as
//! the plain path, so neither mode blocks the runtime on file I/O.
//!
//! ⚠️ `File::create` truncates. Point this at a file you want to keep and it won't be kept.

use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use crate::handler::{Document, DocumentHandler, HandlerOutcome};
use crate::progress::ProgressMetrics;

// -- hand compressed bytes to the file once this much has piled up
const GZIP_STAGING_FLUSH_BYTES: usize = 256 * 1024;

/// 📦 The `[output]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub gzip: bool,
    /// 🛑 Stop cleanly after this many documents. `0` or absent means no limit.
    #[serde(default)]
    pub max_docs: Option<u64>,
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_file_name() -> String {
    "export.ndjson".to_string()
}

fn default_progress() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            gzip: false,
            max_docs: None,
            progress: default_progress(),
        }
    }
}

/// 🚰 Writes each document as one NDJSON line.
#[derive(Debug)]
pub struct FileSink {
    file: BufWriter<File>,
    gzip: Option<GzEncoder<Vec<u8>>>,
    max_docs: Option<u64>,
    progress: ProgressMetrics,
    file_name: String,
}

impl FileSink {
    /// 🚀 Create (or truncate) the output file.
    pub async fn create(config: &OutputConfig, progress: ProgressMetrics) -> Result<Self> {
        let file = File::create(&config.file_name).await.with_context(|| {
            format!(
                "💀 Could not create output file '{}'. Does the directory exist? Do we have permission? \
                 The filesystem declined to elaborate.",
                config.file_name
            )
        })?;
        Ok(Self {
            file: BufWriter::new(file),
            gzip: config
                .gzip
                .then(|| GzEncoder::new(Vec::with_capacity(GZIP_STAGING_FLUSH_BYTES), Compression::default())),
            max_docs: config.max_docs.filter(|max| *max > 0),
            progress,
            file_name: config.file_name.clone(),
        })
    }

    pub fn docs_written(&self) -> u64 {
        self.progress.docs()
    }

    async fn write_line(&mut self, payload: &[u8]) -> Result<()> {
        match self.gzip.as_mut() {
            Some(encoder) => {
                encoder.write_all(payload)?;
                encoder.write_all(b"\n")?;
                if encoder.get_ref().len() >= GZIP_STAGING_FLUSH_BYTES {
                    let staged = std::mem::take(encoder.get_mut());
                    self.file.write_all(&staged).await?;
                }
            }
            None => {
                self.file.write_all(payload).await?;
                self.file.write_all(b"\n").await?;
            }
        }
        Ok(())
    }

    /// 🗑️ Finish compression, flush everything, draw the last progress frame. Call it.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(encoder) = self.gzip.take() {
            let tail = encoder.finish().context("💀 gzip refused to write its footer")?;
            self.file.write_all(&tail).await?;
        }
        self.file
            .flush()
            .await
            .with_context(|| format!("💀 Flushing '{}' failed. Some documents may be missing.", self.file_name))?;
        self.progress.finish();
        debug!("🚰 closed '{}' after {} docs", self.file_name, self.progress.docs());
        Ok(())
    }
}

#[async_trait]
impl DocumentHandler for FileSink {
    async fn handle(&mut self, doc: Document<'_>) -> HandlerOutcome {
        if self.max_docs.is_some_and(|max| doc.index >= max) {
            trace!("🛑 max_docs reached at document {}", doc.index);
            return HandlerOutcome::Cancel;
        }
        if let Err(err) = self.write_line(doc.payload).await {
            return HandlerOutcome::Fail(err.context(format!("💀 writing to '{}' failed", self.file_name)));
        }
        self.progress.record(doc.payload.len() as u64, doc.total_matches);
        HandlerOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;

    fn doc(payload: &[u8], index: u64) -> Document<'_> {
        Document {
            payload,
            index,
            total_matches: 3,
        }
    }

    fn output(dir: &tempfile::TempDir, gzip: bool, max_docs: Option<u64>) -> OutputConfig {
        OutputConfig {
            file_name: dir.path().join("out.ndjson").to_string_lossy().into_owned(),
            gzip,
            max_docs,
            progress: false,
        }
    }

    #[tokio::test]
    async fn the_one_where_documents_become_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = output(&dir, false, None);
        let mut sink = FileSink::create(&config, ProgressMetrics::hidden("logs")).await.unwrap();

        for (i, payload) in [br#"{"a":1}"#.as_slice(), br#"{"b":"two"}"#.as_slice(), b"{}".as_slice()].into_iter().enumerate() {
            assert!(matches!(sink.handle(doc(payload, i as u64)).await, HandlerOutcome::Continue));
        }
        sink.close().await.unwrap();

        let written = std::fs::read_to_string(&config.file_name).unwrap();
        assert_eq!(written, "{\"a\":1}\n{\"b\":\"two\"}\n{}\n");
        assert_eq!(sink.docs_written(), 3);
    }

    #[tokio::test]
    async fn the_one_where_gzip_round_trips_through_a_real_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let config = output(&dir, true, None);
        let mut sink = FileSink::create(&config, ProgressMetrics::hidden("logs")).await.unwrap();

        let mut expected = String::new();
        for i in 0..5000u64 {
            let line = format!(r#"{{"n":{i},"pad":"{}"}}"#, "x".repeat((i % 97) as usize));
            assert!(matches!(sink.handle(doc(line.as_bytes(), i)).await, HandlerOutcome::Continue));
            expected.push_str(&line);
            expected.push('\n');
        }
        sink.close().await.unwrap();

        let compressed = std::fs::read(&config.file_name).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn the_one_where_noise_fills_the_staging_buffer_and_it_drains() {
        let dir = tempfile::tempdir().unwrap();
        let config = output(&dir, true, None);
        let mut sink = FileSink::create(&config, ProgressMetrics::hidden("logs")).await.unwrap();

        // -- xorshift hex barely compresses, so ~1.5 MB of it stages well past the flush mark
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut expected = String::new();
        for i in 0..1500u64 {
            let noise: String = (0..64)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    format!("{state:016x}")
                })
                .collect();
            let line = format!(r#"{{"n":{i},"noise":"{noise}"}}"#);
            assert!(matches!(sink.handle(doc(line.as_bytes(), i)).await, HandlerOutcome::Continue));
            expected.push_str(&line);
            expected.push('\n');
        }
        let staged = sink.gzip.as_ref().map(|encoder| encoder.get_ref().len()).unwrap();
        assert!(staged < GZIP_STAGING_FLUSH_BYTES, "staging never drained: {staged} bytes");
        sink.close().await.unwrap();

        let compressed = std::fs::read(&config.file_name).unwrap();
        assert!(compressed.len() > 2 * GZIP_STAGING_FLUSH_BYTES);
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, expected);
    }

    #[tokio::test]
    async fn the_one_where_max_docs_says_enough() {
        let dir = tempfile::tempdir().unwrap();
        let config = output(&dir, false, Some(2));
        let mut sink = FileSink::create(&config, ProgressMetrics::hidden("logs")).await.unwrap();

        assert!(matches!(sink.handle(doc(b"{}", 0)).await, HandlerOutcome::Continue));
        assert!(matches!(sink.handle(doc(b"{}", 1)).await, HandlerOutcome::Continue));
        assert!(matches!(sink.handle(doc(b"{}", 2)).await, HandlerOutcome::Cancel));
        sink.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(&config.file_name).unwrap(), "{}\n{}\n");
    }

    #[tokio::test]
    async fn the_one_where_the_directory_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            file_name: dir.path().join("nope/out.ndjson").to_string_lossy().into_owned(),
            ..OutputConfig::default()
        };
        let err = FileSink::create(&config, ProgressMetrics::hidden("logs")).await.unwrap_err();
        assert!(err.to_string().contains("Could not create output file"));
    }
}
