// AI
//! 📊 progress.rs: "Are we there yet?" Every pipeline, every time, forever.
//!
//! 🚀 Two jobs. While a table exports, a spinner shows how many uncompressed bytes went
//! into the compressor, how many chunks got sealed, and how fast. After the run, a
//! `RunReport` renders as a table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching this spinner will not make it go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte. not a megabyte, pedants. there's a difference and I will die on this hill.
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// ⏱️ COPY hands over roughly one buffer per row. Sampling and redrawing that often
/// would cost more than the gzip, so both wait at least this long between turns.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
/// 📈 how far back the rate looks
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes, scaled to whatever unit keeps the number readable.
/// Because "1073741824 bytes" is a war crime in a UI.
fn format_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        // -- 🐛 raw bytes mode. small tables need love too.
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 The live spinner for one table's export.
///
/// Uses a sliding 5-second window for the rate so a burst of big COPY buffers
/// doesn't make the number look like a seismograph. Samples are taken at most every
/// `SAMPLE_INTERVAL`, so the window stays a few dozen entries long however many
/// buffers go by.
pub(crate) struct TableProgress {
    /// 🏷️ `public.orders_view -> orders`, or just `public.orders`
    label: String,
    uncompressed_bytes: u64,
    chunks_sealed: u32,
    spinner: ProgressBar,
    /// 🔄 (timestamp, uncompressed bytes) samples for the rate
    rate_samples: VecDeque<(Instant, u64)>,
    last_sample: Instant,
    start_time: Instant,
}

impl std::fmt::Debug for TableProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("TableProgress")
            .field("label", &self.label)
            .field("uncompressed_bytes", &self.uncompressed_bytes)
            .field("chunks_sealed", &self.chunks_sealed)
            .finish()
    }
}

impl TableProgress {
    /// 🚀 A spinner on stderr. indicatif stays quiet on its own when stderr isn't a terminal.
    pub(crate) fn new(label: String) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self::with_bar(label, spinner)
    }

    /// 🙈 Same bookkeeping, nothing drawn.
    pub(crate) fn hidden(label: String) -> Self {
        Self::with_bar(label, ProgressBar::hidden())
    }

    fn with_bar(label: String, spinner: ProgressBar) -> Self {
        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        rate_samples.push_back((start_time, 0u64));
        let progress = Self {
            label,
            uncompressed_bytes: 0,
            chunks_sealed: 0,
            spinner,
            rate_samples,
            last_sample: start_time,
            start_time,
        };
        progress.render(0.0);
        progress
    }

    /// 📦 Count bytes that went into the compressor. Redraws only once per `SAMPLE_INTERVAL`.
    pub(crate) fn add_bytes(&mut self, bytes: u64) {
        self.uncompressed_bytes += bytes;
        if self.last_sample.elapsed() >= SAMPLE_INTERVAL {
            self.refresh();
        }
    }

    /// 🔒 One more chunk sealed and handed to the uploader.
    pub(crate) fn chunk_sealed(&mut self) {
        self.chunks_sealed += 1;
        self.refresh();
    }

    pub(crate) fn uncompressed_bytes(&self) -> u64 {
        self.uncompressed_bytes
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// ✅ Stop spinning, leave the final numbers on screen.
    pub(crate) fn finish(&mut self) {
        self.refresh();
        self.spinner.finish();
    }

    fn refresh(&mut self) {
        let mib_per_sec = self.calculate_rate();
        self.render(mib_per_sec);
    }

    /// 📈 MiB/s over the last `RATE_WINDOW`.
    fn calculate_rate(&mut self) -> f64 {
        let now = Instant::now();
        self.last_sample = now;
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.uncompressed_bytes));

        match self.rate_samples.front() {
            Some(&(oldest_time, oldest_bytes)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    let bytes_delta = self.uncompressed_bytes.saturating_sub(oldest_bytes);
                    (bytes_delta as f64 / elapsed) / MIB as f64
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    fn render(&self, mib_per_sec: f64) {
        self.spinner.set_message(format!(
            "{}: {} read, {} chunk(s) sealed, {:.2} MiB/s, {} elapsed",
            self.label,
            format_bytes(self.uncompressed_bytes),
            self.chunks_sealed,
            mib_per_sec,
            format_duration(self.start_time.elapsed())
        ));
    }
}

/// 🧾 What happened to one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    /// 🏷️ the source table, as `schema.name`
    pub table: String,
    pub target: String,
    pub chunks: usize,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub elapsed: Duration,
}

/// 🧾 What happened to the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
    /// 🙈 tables discovered but not replicated (every column unsupported)
    pub skipped: Vec<String>,
}

impl RunReport {
    /// 🎨 The end-of-run summary: one row per replicated table, plus a totals row.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            "table",
            "target",
            "chunks",
            "uncompressed",
            "compressed",
            "elapsed",
        ]);

        for report in &self.tables {
            table.add_row(vec![
                Cell::new(&report.table),
                Cell::new(&report.target),
                Cell::new(format_number(report.chunks as u64)).set_alignment(CellAlignment::Right),
                Cell::new(format_bytes(report.uncompressed_bytes)).set_alignment(CellAlignment::Right),
                Cell::new(format_bytes(report.compressed_bytes)).set_alignment(CellAlignment::Right),
                Cell::new(format_duration(report.elapsed)).set_alignment(CellAlignment::Right),
            ]);
        }

        let the_total_elapsed: Duration = self.tables.iter().map(|r| r.elapsed).sum();
        table.add_row(vec![
            Cell::new(format!("{} table(s)", self.tables.len())),
            Cell::new(""),
            Cell::new(format_number(self.tables.iter().map(|r| r.chunks as u64).sum()))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(self.tables.iter().map(|r| r.uncompressed_bytes).sum()))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(self.tables.iter().map(|r| r.compressed_bytes).sum()))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_duration(the_total_elapsed)).set_alignment(CellAlignment::Right),
        ]);

        if self.skipped.is_empty() {
            table.to_string()
        } else {
            format!("{table}\nskipped: {}", self.skipped.join(", "))
        }
    }
}
