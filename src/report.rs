//! Run reporting: render the log through a sink and settle the correction file.

use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::csv_io::CorrectionFile;
use crate::model::Item;
use crate::reconcile::{LogEntry, LogLevel, UnresolvedRecord};

/// Destination for operator-facing log entries.
pub trait LogSink {
    fn emit(&mut self, entry: &LogEntry);
}

/// Renders entries as `tracing` events.
#[derive(Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&mut self, entry: &LogEntry) {
        let line = entry.line.unwrap_or(0);
        match entry.level {
            LogLevel::Info => info!(line, "{}", entry.message),
            LogLevel::Warn => warn!(line, "{}", entry.message),
            LogLevel::Error => error!(line, "{}", entry.message),
        }
    }
}

/// Keeps entries in memory; handy for tests and for callers that render
/// the log themselves.
#[derive(Default)]
pub struct VecSink {
    pub entries: Vec<LogEntry>,
}

impl LogSink for VecSink {
    fn emit(&mut self, entry: &LogEntry) {
        self.entries.push(entry.clone());
    }
}

/// Emit every entry, then write the unresolved records to `correction`, or
/// delete it when there are none. Returns the written file's path.
pub fn finish_report(
    log: &[LogEntry],
    unresolved: &[UnresolvedRecord],
    correction: CorrectionFile,
    sink: &mut dyn LogSink,
    write_buf_bytes: usize,
) -> Result<Option<PathBuf>> {
    for entry in log {
        sink.emit(entry);
    }
    if unresolved.is_empty() {
        correction.discard()?;
        return Ok(None);
    }
    let items: Vec<Item> = unresolved.iter().map(|u| u.item.clone()).collect();
    let path = correction.write(&items, write_buf_bytes)?;
    sink.emit(&LogEntry::warn(
        None,
        format!("{} unresolved record(s) written to {}", unresolved.len(), path.display()),
    ));
    Ok(Some(path))
}
