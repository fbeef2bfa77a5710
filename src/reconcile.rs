//! Reconciliation: classify every parsed row against the registry.
//!
//! Each line yields exactly one [`Outcome`]. Records that need a write land in
//! `to_create` / `to_update`; rows that cannot be resolved automatically land
//! in `unresolved` together with their cause.

use ahash::AHashMap;
use tracing::debug;

use crate::error::IngestError;
use crate::model::{AuditStamp, Item, Stream, TagMatch, UpdatePolicy};
use crate::parser::{stream_to_item, RowFailure};
use crate::registry::StoreClient;

/// Sensor ids seen so far in one run, with the line that introduced them.
#[derive(Debug, Default)]
pub struct DuplicateTracker {
    seen: AHashMap<String, usize>,
}

impl DuplicateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `sensor_id` at `line`. Returns the earlier line if it was
    /// already seen; the first line is kept in that case.
    pub fn check(&mut self, sensor_id: &str, line: usize) -> Option<usize> {
        if let Some(&first) = self.seen.get(sensor_id) {
            return Some(first);
        }
        self.seen.insert(sensor_id.to_string(), line);
        None
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Create,
    /// `changed` lists the comparable fields that differ; empty when only tags differ.
    Update { changed: Vec<&'static str> },
    Unchanged,
    Duplicate { first_line: usize },
    Ambiguous { matches: usize },
    LookupFailed,
    ParseFailed,
}

impl Outcome {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Outcome::Ambiguous { .. } | Outcome::LookupFailed | Outcome::ParseFailed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineOutcome {
    pub line: usize,
    pub sensor_id: String,
    pub outcome: Outcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One operator-facing message, in the order it was produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub line: Option<usize>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn info(line: Option<usize>, message: impl Into<String>) -> Self {
        Self { line, level: LogLevel::Info, message: message.into() }
    }
    pub fn warn(line: Option<usize>, message: impl Into<String>) -> Self {
        Self { line, level: LogLevel::Warn, message: message.into() }
    }
    pub fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self { line, level: LogLevel::Error, message: message.into() }
    }
}

/// A row or record the tool could not settle, kept in CSV form for the
/// correction file.
#[derive(Debug)]
pub struct UnresolvedRecord {
    pub line: Option<usize>,
    pub item: Item,
    pub cause: IngestError,
}

/// Per-outcome counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub create: usize,
    pub update: usize,
    pub unchanged: usize,
    pub duplicate: usize,
    pub ambiguous: usize,
    pub lookup_failed: usize,
    pub parse_failed: usize,
}

/// A record queued for writing, with the input line it came from.
#[derive(Clone, Debug)]
pub struct PendingWrite {
    pub line: usize,
    pub stream: Stream,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub to_create: Vec<PendingWrite>,
    /// Merged records, ready to replace their registry counterparts.
    pub to_update: Vec<PendingWrite>,
    pub unresolved: Vec<UnresolvedRecord>,
    pub outcomes: Vec<LineOutcome>,
    pub log: Vec<LogEntry>,
}

impl Reconciliation {
    pub fn tally(&self) -> Tally {
        let mut t = Tally::default();
        for o in &self.outcomes {
            match o.outcome {
                Outcome::Create => t.create += 1,
                Outcome::Update { .. } => t.update += 1,
                Outcome::Unchanged => t.unchanged += 1,
                Outcome::Duplicate { .. } => t.duplicate += 1,
                Outcome::Ambiguous { .. } => t.ambiguous += 1,
                Outcome::LookupFailed => t.lookup_failed += 1,
                Outcome::ParseFailed => t.parse_failed += 1,
            }
        }
        t
    }

    /// Outcome recorded for `line`, if any.
    pub fn outcome_at(&self, line: usize) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.line == line).map(|o| &o.outcome)
    }
}

/// Owns the state of one reconciliation run. Feed rows in file order with
/// [`Reconciler::push`], then take the result with [`Reconciler::finish`].
pub struct Reconciler<'a> {
    registry: &'a dyn StoreClient,
    policy: UpdatePolicy,
    tag_match: TagMatch,
    stamp: AuditStamp,
    duplicates: DuplicateTracker,
    out: Reconciliation,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a dyn StoreClient, policy: UpdatePolicy, tag_match: TagMatch, stamp: AuditStamp) -> Self {
        Self { registry, policy, tag_match, stamp, duplicates: DuplicateTracker::new(), out: Reconciliation::default() }
    }

    /// Classify one row. Registry lookups happen here, inline.
    pub fn push(&mut self, line: usize, parsed: Result<Stream, RowFailure>) -> &Outcome {
        let (sensor_id, outcome) = match parsed {
            Ok(stream) => {
                let sensor_id = stream.sensor_id.clone();
                (sensor_id, self.classify(line, stream))
            }
            Err(RowFailure { item, error }) => {
                self.out.log.push(LogEntry::error(Some(line), error.to_string()));
                let sensor_id = item.sensor_id.clone();
                self.out.unresolved.push(UnresolvedRecord { line: Some(line), item, cause: error });
                (sensor_id, Outcome::ParseFailed)
            }
        };
        debug!(line, sensor_id = %sensor_id, outcome = ?outcome, "classified");
        let idx = self.out.outcomes.len();
        self.out.outcomes.push(LineOutcome { line, sensor_id, outcome });
        &self.out.outcomes[idx].outcome
    }

    fn classify(&mut self, line: usize, incoming: Stream) -> Outcome {
        if let Some(first_line) = self.duplicates.check(&incoming.sensor_id, line) {
            let err = IngestError::DuplicateKey { line, first_line, sensor_id: incoming.sensor_id.clone() };
            self.out.log.push(LogEntry::warn(Some(line), err.to_string()));
            return Outcome::Duplicate { first_line };
        }

        let mut found = match self.registry.find(&incoming.sensor_id, &incoming.site_code) {
            Ok(found) => found,
            Err(source) => {
                let cause = IngestError::RegistryLookup {
                    line,
                    sensor_id: incoming.sensor_id.clone(),
                    site_code: incoming.site_code.clone(),
                    source,
                };
                return self.unresolved(line, &incoming, cause, Outcome::LookupFailed);
            }
        };

        match found.len() {
            0 => {
                self.out.to_create.push(PendingWrite { line, stream: incoming });
                Outcome::Create
            }
            1 => {
                let mut stored = found.remove(0);
                if stored.matches(&incoming, self.tag_match) {
                    return Outcome::Unchanged;
                }
                let changed = stored.field_diff(&incoming);
                if !changed.is_empty() && self.policy == UpdatePolicy::TagsOnly {
                    self.out.log.push(LogEntry::warn(
                        Some(line),
                        format!(
                            "sensor '{}' differs in {}; tags-only update leaves those fields as stored",
                            incoming.sensor_id,
                            changed.join(", ")
                        ),
                    ));
                }
                stored.merge_from(&incoming, self.policy, &self.stamp);
                self.out.log.push(LogEntry::info(
                    Some(line),
                    format!("update sensor '{}' ({}) at site '{}'", stored.sensor_id, stored.id, stored.site_code),
                ));
                self.out.to_update.push(PendingWrite { line, stream: stored });
                Outcome::Update { changed }
            }
            matches => {
                let cause = IngestError::RegistryAmbiguity {
                    line,
                    sensor_id: incoming.sensor_id.clone(),
                    site_code: incoming.site_code.clone(),
                    matches,
                };
                self.unresolved(line, &incoming, cause, Outcome::Ambiguous { matches })
            }
        }
    }

    fn unresolved(&mut self, line: usize, incoming: &Stream, cause: IngestError, outcome: Outcome) -> Outcome {
        self.out.log.push(LogEntry::error(Some(line), cause.to_string()));
        self.out.unresolved.push(UnresolvedRecord { line: Some(line), item: stream_to_item(incoming), cause });
        outcome
    }

    pub fn finish(self) -> Reconciliation {
        self.out
    }
}

/// Reconcile a whole row sequence in one call.
pub fn reconcile<I>(
    rows: I,
    registry: &dyn StoreClient,
    policy: UpdatePolicy,
    tag_match: TagMatch,
    stamp: AuditStamp,
) -> Reconciliation
where
    I: IntoIterator<Item = (usize, Result<Stream, RowFailure>)>,
{
    let mut r = Reconciler::new(registry, policy, tag_match, stamp);
    for (line, parsed) in rows {
        r.push(line, parsed);
    }
    r.finish()
}
