//! Metrics forwarding.
//!
//! The engine reports counters through an abstract [`StatsSink`]; the
//! supported text encoding is the graphite line form
//! `prefix.path;tag=val;tag2=val2 value timestamp\n`.

use std::io::Write;

use parking_lot::Mutex;
use tracing::warn;

/// Receives `(metric_path, tags, value, timestamp)` tuples.
pub trait StatsSink: Send + Sync {
    fn record(&self, metric_path: &str, tags: &[(String, String)], value: f64, timestamp: u64);
}

/// Renders one metric in the graphite text form.
pub fn graphite_line(
    prefix: &str,
    metric_path: &str,
    tags: &[(String, String)],
    value: f64,
    timestamp: u64,
) -> String {
    let mut line = String::new();
    if prefix.is_empty() {
        line.push_str(metric_path);
    } else {
        line.push_str(prefix);
        line.push('.');
        line.push_str(metric_path);
    }
    for (tag, tag_value) in tags {
        line.push(';');
        line.push_str(tag);
        line.push('=');
        line.push_str(tag_value);
    }
    line.push(' ');
    line.push_str(&value.to_string());
    line.push(' ');
    line.push_str(&timestamp.to_string());
    line.push('\n');
    line
}

/// Writes graphite lines to any byte sink (a socket, a file, a buffer).
pub struct TextStatsForwarder<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> TextStatsForwarder<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> StatsSink for TextStatsForwarder<W> {
    fn record(&self, metric_path: &str, tags: &[(String, String)], value: f64, timestamp: u64) {
        let line = graphite_line(&self.prefix, metric_path, tags, value, timestamp);
        let mut writer = self.writer.lock();
        if let Err(err) = writer.write_all(line.as_bytes()) {
            warn!(%err, metric_path, "failed to forward metric");
        }
    }
}
