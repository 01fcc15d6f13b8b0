//! 📊 progress — "how many are left?" asked once per document, answered with a table.
//!
//! The bar counts documents against `hits.total`, which the cluster reports on every
//! page (and may revise, if someone is writing to the index while we read it). Bytes
//! are tracked too, for the MiB/s column, but there is no byte total to aim for.
//!
//! Rates come from a 5-second sliding window so one slow page doesn't look like a crash.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: f64 = 1024.0 * 1024.0;
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 🔢 `1234567` → `1,234,567`
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ `MM:SS`, or `HH:MM:SS` once the export has outlived your lunch break
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Rates {
    docs_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Documents exported vs. documents matched, with rates and an ETA.
pub struct ProgressMetrics {
    index: String,
    total_matches: u64,
    docs: u64,
    bytes: u64,
    bar: ProgressBar,
    samples: VecDeque<(Instant, u64, u64)>,
    start: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar has no Debug of its own
        f.debug_struct("ProgressMetrics")
            .field("index", &self.index)
            .field("total_matches", &self.total_matches)
            .field("docs", &self.docs)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A visible bar on stderr.
    pub fn new(index: impl Into<String>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self::with_bar(index.into(), bar)
    }

    /// 🙈 Same bookkeeping, nothing drawn. For tests and `progress = false`.
    pub fn hidden(index: impl Into<String>) -> Self {
        Self::with_bar(index.into(), ProgressBar::hidden())
    }

    fn with_bar(index: String, bar: ProgressBar) -> Self {
        let start = Instant::now();
        Self {
            index,
            total_matches: 0,
            docs: 0,
            bytes: 0,
            bar,
            samples: VecDeque::from([(start, 0, 0)]),
            start,
        }
    }

    /// 📄 One more document made it out. `total_matches` is whatever the latest page said.
    pub fn record(&mut self, bytes: u64, total_matches: u64) {
        self.docs += 1;
        self.bytes += bytes;
        if total_matches != self.total_matches {
            self.total_matches = total_matches;
            self.bar.set_length(total_matches);
        }
        self.bar.set_position(self.docs);
        // -- redrawing the table per document is a lot of string formatting for no visible gain
        if self.docs % 256 == 1 {
            let rates = self.rates();
            self.render(rates);
        }
    }

    pub fn docs(&self) -> u64 {
        self.docs
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// ✅ Draw the final numbers and leave the bar on screen.
    pub fn finish(&mut self) {
        let rates = self.rates();
        self.render(rates);
        self.bar.finish();
    }

    fn rates(&mut self) -> Rates {
        let now = Instant::now();
        while let Some(&(at, _, _)) = self.samples.front() {
            if now.duration_since(at) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.docs, self.bytes));

        let Some(&(oldest, oldest_docs, oldest_bytes)) = self.samples.front() else {
            return Rates::default();
        };
        let elapsed = now.duration_since(oldest).as_secs_f64();
        if elapsed <= 0.0 {
            return Rates::default();
        }
        Rates {
            docs_per_sec: self.docs.saturating_sub(oldest_docs) as f64 / elapsed,
            mib_per_sec: self.bytes.saturating_sub(oldest_bytes) as f64 / elapsed / MIB,
        }
    }

    fn percent(&self) -> f64 {
        if self.total_matches == 0 {
            0.0
        } else {
            (self.docs as f64 / self.total_matches as f64 * 100.0).min(100.0)
        }
    }

    fn remaining(&self, rates: Rates) -> String {
        let left = self.total_matches.saturating_sub(self.docs);
        if left == 0 || rates.docs_per_sec <= 0.0 {
            return "--:--".to_string();
        }
        format_duration(Duration::from_secs_f64(left as f64 / rates.docs_per_sec))
    }

    fn render(&self, rates: Rates) {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        let right = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);

        table.add_row(vec![
            right(format!("{} Docs/s", format_number(rates.docs_per_sec as u64))),
            right(format!(
                "{} / {} Docs",
                format_number(self.docs),
                format_number(self.total_matches)
            )),
        ]);
        table.add_row(vec![
            right(format!("{:.2} MiB/s", rates.mib_per_sec)),
            right(format!("{:.2} MiB", self.bytes as f64 / MIB)),
        ]);
        table.add_row(vec![
            right(format!("{} elapsed", format_duration(self.start.elapsed()))),
            right(format!("{} remaining", self.remaining(rates))),
        ]);

        self.bar.set_message(format!(
            "index: {} ({:.2}%)\n{}",
            self.index,
            self.percent(),
            table
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(40_000_000), "40,000,000");
    }

    #[test]
    fn the_one_where_long_exports_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "03:01:01");
    }

    #[test]
    fn the_one_where_the_total_moves_and_the_bar_follows() {
        let mut progress = ProgressMetrics::hidden("logs");
        progress.record(100, 10);
        progress.record(50, 12);
        assert_eq!(progress.docs(), 2);
        assert_eq!(progress.bytes(), 150);
        assert_eq!(progress.total_matches, 12);
        assert!((progress.percent() - 100.0 * 2.0 / 12.0).abs() < 1e-9);
        progress.finish();
    }

    #[test]
    fn the_one_where_percent_never_exceeds_one_hundred() {
        let mut progress = ProgressMetrics::hidden("logs");
        for _ in 0..5 {
            progress.record(1, 3);
        }
        assert_eq!(progress.percent(), 100.0);
        assert_eq!(progress.remaining(Rates { docs_per_sec: 10.0, mib_per_sec: 0.0 }), "--:--");
    }
}
