use crate::batch::{BatchWriter, WriteFailure};
use crate::config::IngestOptions;
use crate::csv_io::{count_data_rows, CorrectionFile, CsvRowSource, RejectedRow};
use crate::error::{IngestError, WriteKind};
use crate::model::{AuditStamp, Stream, TagMatch, UpdatePolicy};
use crate::parser::{parse_row, salvage_item, stream_to_item, RowFailure};
use crate::progress::ProgressScope;
use crate::reconcile::{DuplicateTracker, LineOutcome, LogEntry, PendingWrite, Reconciler, Tally, UnresolvedRecord};
use crate::registry::StoreClient;
use crate::report::{finish_report, LogSink, TracingSink};
use crate::schema::is_known_process;
use crate::util::init_tracing_once;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Result of `verify`: structural checks only, the registry is never touched.
#[derive(Debug, Default)]
pub struct VerifySummary {
    pub rows: usize,
    pub valid: usize,
    pub parse_failed: usize,
    pub duplicates: usize,
    pub unknown_process: usize,
    pub log: Vec<LogEntry>,
}

impl VerifySummary {
    pub fn is_clean(&self) -> bool {
        self.parse_failed == 0 && self.duplicates == 0
    }
}

/// Result of `check`: what `ingest` would do, without writing anything.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub tally: Tally,
    pub outcomes: Vec<LineOutcome>,
    pub unresolved: usize,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub tally: Tally,
    pub outcomes: Vec<LineOutcome>,
    pub created: usize,
    pub updated: usize,
    pub write_failures: usize,
    pub submissions: usize,
    pub unresolved: usize,
    /// Present only when something was left unresolved.
    pub correction_file: Option<PathBuf>,
    pub log: Vec<LogEntry>,
}

/// Builder facade over the verify / check / ingest commands.
#[derive(Clone, Default)]
pub struct StreamIngest {
    pub(crate) opts: IngestOptions,
}

impl StreamIngest {
    pub fn new() -> Self {
        Self { opts: IngestOptions::default() }
    }

    pub fn with_options(opts: IngestOptions) -> Self {
        Self { opts }
    }

    // -------- Builder methods --------
    pub fn user(mut self, user: impl Into<String>) -> Self { self.opts = self.opts.with_user(user); self }
    pub fn update_policy(mut self, policy: UpdatePolicy) -> Self { self.opts = self.opts.with_update_policy(policy); self }
    pub fn full_update(mut self, yes: bool) -> Self { self.opts = self.opts.with_full_update(yes); self }
    pub fn tag_match(mut self, mode: TagMatch) -> Self { self.opts = self.opts.with_tag_match(mode); self }
    pub fn batch_size_limit(mut self, bytes: usize) -> Self { self.opts = self.opts.with_batch_size_limit(bytes); self }
    pub fn max_batch_operations(mut self, max: Option<usize>) -> Self { self.opts = self.opts.with_max_batch_operations(max); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn correction_prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_correction_prefix(prefix); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    pub fn options(&self) -> &IngestOptions {
        &self.opts
    }

    // -------- Commands --------

    pub fn verify(&self, path: &Path) -> Result<VerifySummary> {
        self.verify_with(path, &mut TracingSink)
    }

    /// Header, row and duplicate checks. Unknown process codes are warned about.
    pub fn verify_with(&self, path: &Path, sink: &mut dyn LogSink) -> Result<VerifySummary> {
        init_tracing_once();
        let source = self.open_source(path)?;
        let progress = self.progress_for(path, "Verifying")?;
        let stamp = self.stamp("verify");

        let mut summary = VerifySummary::default();
        let mut duplicates = DuplicateTracker::new();
        for (line, parsed) in parsed_rows(source, &stamp) {
            summary.rows += 1;
            progress.inc_items(1);
            let stream = match parsed {
                Ok(stream) => stream,
                Err(RowFailure { error, .. }) => {
                    summary.parse_failed += 1;
                    summary.log.push(LogEntry::error(Some(line), error.to_string()));
                    continue;
                }
            };
            if let Some(first_line) = duplicates.check(&stream.sensor_id, line) {
                summary.duplicates += 1;
                let err = IngestError::DuplicateKey { line, first_line, sensor_id: stream.sensor_id };
                summary.log.push(LogEntry::warn(Some(line), err.to_string()));
                continue;
            }
            summary.valid += 1;
            if !is_known_process(&stream.process) {
                summary.unknown_process += 1;
                summary.log.push(LogEntry::warn(
                    Some(line),
                    format!("sensor '{}' has unknown process code '{}'", stream.sensor_id, stream.process),
                ));
            }
        }
        progress.finish("verified");

        for entry in &summary.log {
            sink.emit(entry);
        }
        tracing::info!(
            rows = summary.rows,
            valid = summary.valid,
            parse_failed = summary.parse_failed,
            duplicates = summary.duplicates,
            "verify finished"
        );
        Ok(summary)
    }

    pub fn check(&self, path: &Path, registry: &dyn StoreClient) -> Result<CheckSummary> {
        self.check_with(path, registry, &mut TracingSink)
    }

    /// Reconcile against the registry without writing to it.
    pub fn check_with(&self, path: &Path, registry: &dyn StoreClient, sink: &mut dyn LogSink) -> Result<CheckSummary> {
        init_tracing_once();
        let source = self.open_source(path)?;
        let progress = self.progress_for(path, "Checking")?;
        let stamp = self.stamp("check");

        let mut reconciler = Reconciler::new(registry, self.opts.update_policy, self.opts.tag_match, stamp.clone());
        for (line, parsed) in parsed_rows(source, &stamp) {
            reconciler.push(line, parsed);
            progress.inc_items(1);
        }
        progress.finish("checked");
        let rec = reconciler.finish();

        for entry in &rec.log {
            sink.emit(entry);
        }
        let tally = rec.tally();
        tracing::info!(
            create = tally.create,
            update = tally.update,
            unchanged = tally.unchanged,
            unresolved = rec.unresolved.len(),
            "check finished"
        );
        Ok(CheckSummary { tally, outcomes: rec.outcomes, unresolved: rec.unresolved.len(), log: rec.log })
    }

    pub fn ingest(&self, path: &Path, registry: &dyn StoreClient) -> Result<IngestSummary> {
        self.ingest_with(path, registry, &mut TracingSink)
    }

    /// Full run: reconcile, write in batches, report. Input and output files
    /// are opened before the first registry call.
    pub fn ingest_with(&self, path: &Path, registry: &dyn StoreClient, sink: &mut dyn LogSink) -> Result<IngestSummary> {
        init_tracing_once();
        if self.opts.user.trim().is_empty() {
            bail!("a user id is required to stamp audit fields");
        }
        let source = self.open_source(path)?;
        let correction =
            CorrectionFile::allocate(&self.opts.output_dir, &self.opts.correction_prefix, OffsetDateTime::now_utc())
                .context("allocate correction file")?;
        let progress = self.progress_for(path, "Reconciling")?;
        let stamp = AuditStamp::now(self.opts.user.clone());

        let mut reconciler = Reconciler::new(registry, self.opts.update_policy, self.opts.tag_match, stamp.clone());
        for (line, parsed) in parsed_rows(source, &stamp) {
            reconciler.push(line, parsed);
            progress.inc_items(1);
        }
        progress.finish("reconciled");
        let mut rec = reconciler.finish();
        let tally = rec.tally();

        let mut writer = BatchWriter::new(registry, self.opts.batch_limits());
        for PendingWrite { line, stream } in std::mem::take(&mut rec.to_create) {
            writer.add_from_line(line, WriteKind::Create, stream);
        }
        for PendingWrite { line, stream } in std::mem::take(&mut rec.to_update) {
            writer.add_from_line(line, WriteKind::Replace, stream);
        }
        let failures = writer.close_all();
        let write_failures = failures.len();
        for WriteFailure { line, stream, error, .. } in failures {
            rec.log.push(LogEntry::error(line, error.to_string()));
            rec.unresolved.push(UnresolvedRecord { line, item: stream_to_item(&stream), cause: error });
        }

        let unresolved = rec.unresolved.len();
        let correction_file =
            finish_report(&rec.log, &rec.unresolved, correction, sink, self.opts.write_buffer_bytes)
                .context("write correction file")?;

        tracing::info!(
            created = writer.created(),
            updated = writer.replaced(),
            unchanged = tally.unchanged,
            unresolved,
            submissions = writer.submissions(),
            "ingest finished"
        );
        Ok(IngestSummary {
            tally,
            outcomes: rec.outcomes,
            created: writer.created(),
            updated: writer.replaced(),
            write_failures,
            submissions: writer.submissions(),
            unresolved,
            correction_file,
            log: rec.log,
        })
    }

    // -------- helpers --------

    fn open_source(&self, path: &Path) -> Result<CsvRowSource> {
        CsvRowSource::open(path, self.opts.read_buffer_bytes).with_context(|| format!("open {}", path.display()))
    }

    fn progress_for(&self, path: &Path, default_label: &str) -> Result<ProgressScope> {
        if !self.opts.progress {
            return Ok(ProgressScope::disabled());
        }
        let total = count_data_rows(path)?;
        let label = self.opts.progress_label.clone().unwrap_or_else(|| default_label.to_string());
        Ok(ProgressScope::count(label, total))
    }

    fn stamp(&self, fallback_user: &str) -> AuditStamp {
        if self.opts.user.trim().is_empty() {
            AuditStamp::now(fallback_user)
        } else {
            AuditStamp::now(self.opts.user.clone())
        }
    }
}

/// Parse every row of `source` lazily, in file order.
fn parsed_rows(
    source: CsvRowSource,
    stamp: &AuditStamp,
) -> impl Iterator<Item = (usize, Result<Stream, RowFailure>)> + '_ {
    let header = source.header().to_vec();
    source.map(move |(line, read)| match read {
        Ok(row) => (line, parse_row(&header, &row, line, stamp)),
        Err(RejectedRow { cells, error }) => (line, Err(RowFailure { item: salvage_item(&header, &cells), error })),
    })
}
